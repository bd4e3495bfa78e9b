use toml::value::Table;
use toml::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Linux,
    Darwin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostArch {
    X86_64,
    Arm64,
    Other,
}

/// The running host, detected once and threaded through every resolution
/// call site so tests can pin an arbitrary platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostPlatform {
    pub family: OsFamily,
    pub arch: HostArch,
}

impl HostPlatform {
    /// Non-Darwin hosts take the Linux overlay set.
    pub fn detect() -> Self {
        let family = match std::env::consts::OS {
            "macos" => OsFamily::Darwin,
            _ => OsFamily::Linux,
        };
        let arch = match std::env::consts::ARCH {
            "x86_64" => HostArch::X86_64,
            "aarch64" | "arm" => HostArch::Arm64,
            _ => HostArch::Other,
        };
        Self { family, arch }
    }

    pub const fn new(family: OsFamily, arch: HostArch) -> Self {
        Self { family, arch }
    }

    /// Overlay keys to consult for this host, in application order.
    fn overlay_keys(self) -> Vec<&'static str> {
        match self.family {
            OsFamily::Linux => {
                let mut keys = vec!["linux_any"];
                if self.arch != HostArch::Arm64 {
                    keys.push("linux_x86_64");
                }
                keys
            }
            OsFamily::Darwin => {
                let mut keys = vec!["universal"];
                keys.push(match self.arch {
                    HostArch::Arm64 => "arm64",
                    _ => "x86_64",
                });
                keys
            }
        }
    }
}

/// Look `key` up inside one overlay value. An overlay is either a table
/// holding the key directly, or an array of tables in which case only the
/// first element is consulted.
fn overlay_lookup<'a>(overlay: &'a Value, key: &str) -> Option<&'a Value> {
    match overlay {
        Value::Table(table) => table.get(key),
        Value::Array(items) => items
            .first()
            .and_then(Value::as_table)
            .and_then(|table| table.get(key)),
        _ => None,
    }
}

/// Empty strings, empty arrays and `false` never override a running value.
fn is_meaningful(value: &Value) -> bool {
    match value {
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Boolean(b) => *b,
        _ => true,
    }
}

/// Scalar-mode resolution: the direct entry under `key`, then each matching
/// platform overlay in order, later values replacing earlier ones.
pub fn resolve_scalar(table: &Table, key: &str, host: HostPlatform) -> Option<Value> {
    let mut result = table.get(key).cloned();

    for overlay_key in host.overlay_keys() {
        let Some(overlay) = table.get(overlay_key) else {
            continue;
        };
        if let Some(value) = overlay_lookup(overlay, key) {
            if is_meaningful(value) {
                result = Some(value.clone());
            }
        }
    }

    result
}

/// Append-mode resolution for list-valued keys: the direct entry's elements
/// followed by each matching overlay's elements, in overlay order. Every
/// call starts from a fresh accumulator.
pub fn resolve_append(table: &Table, key: &str, host: HostPlatform) -> Vec<Value> {
    let mut result = Vec::new();
    extend_from(&mut result, table.get(key));

    for overlay_key in host.overlay_keys() {
        let Some(overlay) = table.get(overlay_key) else {
            continue;
        };
        extend_from(&mut result, overlay_lookup(overlay, key));
    }

    result
}

fn extend_from(accumulator: &mut Vec<Value>, value: Option<&Value>) {
    match value {
        Some(Value::Array(items)) => accumulator.extend(items.iter().cloned()),
        Some(other) => accumulator.push(other.clone()),
        None => {}
    }
}
