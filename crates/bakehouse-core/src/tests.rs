use crate::{
    parse_loose_version, resolve_append, resolve_scalar, ArchiveKind, BakehouseError, HostArch,
    HostPlatform, InstallKind, Manifest, OsFamily,
};

const LINUX_X86: HostPlatform = HostPlatform::new(OsFamily::Linux, HostArch::X86_64);
const LINUX_ARM: HostPlatform = HostPlatform::new(OsFamily::Linux, HostArch::Arm64);
const MAC_ARM: HostPlatform = HostPlatform::new(OsFamily::Darwin, HostArch::Arm64);
const MAC_X86: HostPlatform = HostPlatform::new(OsFamily::Darwin, HostArch::X86_64);

fn table(input: &str) -> toml::value::Table {
    toml::from_str(input).expect("must parse test table")
}

#[test]
fn append_concatenates_direct_then_platform_then_arch() {
    let table = table(
        r#"
        dependencies = ["base"]

        [linux_any]
        dependencies = ["linux-extra"]

        [linux_x86_64]
        dependencies = ["x86-extra"]
        "#,
    );

    let resolved: Vec<String> = resolve_append(&table, "dependencies", LINUX_X86)
        .iter()
        .filter_map(|value| value.as_str().map(str::to_string))
        .collect();
    assert_eq!(resolved, vec!["base", "linux-extra", "x86-extra"]);
}

#[test]
fn append_skips_x86_overlay_on_arm_hosts() {
    let table = table(
        r#"
        dependencies = ["base"]

        [linux_any]
        dependencies = ["linux-extra"]

        [linux_x86_64]
        dependencies = ["x86-extra"]
        "#,
    );

    let resolved: Vec<String> = resolve_append(&table, "dependencies", LINUX_ARM)
        .iter()
        .filter_map(|value| value.as_str().map(str::to_string))
        .collect();
    assert_eq!(resolved, vec!["base", "linux-extra"]);
}

#[test]
fn append_applies_universal_then_detected_mac_arch() {
    let table = table(
        r#"
        scripts = [["make"]]

        [universal]
        scripts = [["make", "universal"]]

        [arm64]
        scripts = [["make", "arm"]]

        [x86_64]
        scripts = [["make", "intel"]]
        "#,
    );

    let arm = resolve_append(&table, "scripts", MAC_ARM);
    assert_eq!(arm.len(), 3);
    assert_eq!(
        arm[2].as_array().expect("must be argv")[1].as_str(),
        Some("arm")
    );

    let intel = resolve_append(&table, "scripts", MAC_X86);
    assert_eq!(
        intel[2].as_array().expect("must be argv")[1].as_str(),
        Some("intel")
    );
}

#[test]
fn append_with_unmatched_platform_yields_only_direct_value() {
    let table = table(
        r#"
        dependencies = ["base"]

        [universal]
        dependencies = ["mac-only"]
        "#,
    );

    let resolved = resolve_append(&table, "dependencies", LINUX_X86);
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].as_str(), Some("base"));
}

#[test]
fn append_of_missing_key_is_empty() {
    let table = table("version = \"1.0\"\n");
    assert!(resolve_append(&table, "dependencies", LINUX_X86).is_empty());
}

#[test]
fn append_uses_fresh_accumulator_per_call() {
    let table = table(
        r#"
        dependencies = ["dep"]
        use = ["tool"]
        "#,
    );

    let deps = resolve_append(&table, "dependencies", LINUX_X86);
    let tools = resolve_append(&table, "use", LINUX_X86);
    assert_eq!(deps.len(), 1);
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].as_str(), Some("tool"));
}

#[test]
fn scalar_overlay_replaces_direct_value() {
    let table = table(
        r#"
        url = "https://example.com/generic.tar.gz"

        [linux_any]
        url = "https://example.com/linux.tar.gz"
        "#,
    );

    let resolved = resolve_scalar(&table, "url", LINUX_ARM).expect("must resolve url");
    assert_eq!(resolved.as_str(), Some("https://example.com/linux.tar.gz"));
}

#[test]
fn scalar_overlay_expressed_as_array_uses_first_element_only() {
    let table = table(
        r#"
        [[linux_any]]
        url = "https://example.com/first.tar.gz"

        [[linux_any]]
        url = "https://example.com/second.tar.gz"
        "#,
    );

    let resolved = resolve_scalar(&table, "url", LINUX_X86).expect("must resolve url");
    assert_eq!(resolved.as_str(), Some("https://example.com/first.tar.gz"));
}

#[test]
fn scalar_missing_everywhere_resolves_to_none() {
    let table = table("[linux_any]\nbranch = \"main\"\n");
    assert!(resolve_scalar(&table, "url", MAC_ARM).is_none());
}

#[test]
fn manifest_requires_a_types_array() {
    let err = Manifest::from_toml_str("version = \"1.0\"\n").expect_err("must reject");
    assert!(err.to_string().contains("types"));

    let err = Manifest::from_toml_str("types = []\n").expect_err("must reject empty types");
    assert!(err.to_string().contains("must not be empty"));
}

#[test]
fn manifest_binary_takes_precedence_over_build() {
    let manifest = Manifest::from_toml_str(
        r#"
        types = ["binary", "build"]

        [binary]
        url = "https://example.com/pkg.tar.gz"
        type = "gz"

        [build]
        repo = "https://example.com/pkg.git"
        "#,
    )
    .expect("must parse manifest");

    assert_eq!(manifest.install_kind(), Some(InstallKind::Binary));
    let section = manifest
        .section(InstallKind::Binary)
        .expect("must expose binary section");
    assert_eq!(
        section.url(LINUX_X86).as_deref(),
        Some("https://example.com/pkg.tar.gz")
    );
    assert_eq!(section.archive_kind_name(LINUX_X86).as_deref(), Some("gz"));
}

#[test]
fn manifest_link_dirs_default_to_bin() {
    let manifest = Manifest::from_toml_str("types = [\"build\"]\n[build]\n")
        .expect("must parse manifest");

    assert_eq!(manifest.link_dirs(LINUX_X86), vec!["bin".to_string()]);
    let section = manifest
        .section(InstallKind::Build)
        .expect("must expose build section");
    assert_eq!(section.link_dirs(MAC_ARM), vec!["bin".to_string()]);
}

#[test]
fn manifest_scripts_resolve_as_argv_lists_with_platform_extension() {
    let manifest = Manifest::from_toml_str(
        r#"
        types = ["build"]

        [build]
        scripts = [["./configure"], ["make"]]
        format_scripts = true

        [build.linux_any]
        scripts = [["make", "install", "PREFIX={prefix}"]]
        "#,
    )
    .expect("must parse manifest");

    let section = manifest
        .section(InstallKind::Build)
        .expect("must expose build section");
    let scripts = section.scripts(LINUX_ARM);
    assert_eq!(scripts.len(), 3);
    assert_eq!(scripts[0], vec!["./configure"]);
    assert_eq!(scripts[2], vec!["make", "install", "PREFIX={prefix}"]);
    assert!(section.format_scripts(LINUX_ARM));
}

#[test]
fn manifest_uninstall_section_nests_under_install_type() {
    let manifest = Manifest::from_toml_str(
        r#"
        types = ["binary"]

        [binary]
        url = "https://example.com/pkg.zip"
        type = "zip"

        [binary.uninstall]
        scripts = [["rm", "-f", "/tmp/state"]]
        "#,
    )
    .expect("must parse manifest");

    let uninstall = manifest
        .section(InstallKind::Binary)
        .expect("must expose binary section")
        .uninstall()
        .expect("must expose uninstall section");
    assert_eq!(uninstall.scripts(LINUX_X86).len(), 1);
}

#[test]
fn manifest_version_tolerates_non_string_scalars() {
    let manifest = Manifest::from_toml_str("types = [\"build\"]\nversion = 2\n[build]\n")
        .expect("must parse manifest");
    assert_eq!(manifest.version().as_deref(), Some("2"));
}

#[test]
fn archive_kind_parses_known_kinds_and_rejects_others() {
    assert_eq!(
        ArchiveKind::parse(" TAR ").expect("must parse tar"),
        ArchiveKind::Tar
    );
    assert_eq!(
        ArchiveKind::parse("gz").expect("must parse gz"),
        ArchiveKind::TarGz
    );
    assert_eq!(
        ArchiveKind::parse("xz").expect("must parse xz"),
        ArchiveKind::TarXz
    );
    assert_eq!(
        ArchiveKind::parse("zip").expect("must parse zip"),
        ArchiveKind::Zip
    );

    let err = ArchiveKind::parse("rar").expect_err("must reject unknown kind");
    assert!(matches!(err, BakehouseError::UnsupportedArchive(kind) if kind == "rar"));
}

#[test]
fn loose_versions_pad_missing_components() {
    let one_zero = parse_loose_version("1.0").expect("must parse 1.0");
    let one_two = parse_loose_version("v1.2").expect("must parse v1.2");
    assert!(one_two > one_zero);
    assert_eq!(
        parse_loose_version("2.3.1").expect("must parse full version"),
        semver::Version::new(2, 3, 1)
    );
    assert!(parse_loose_version("not-a-version").is_none());
}
