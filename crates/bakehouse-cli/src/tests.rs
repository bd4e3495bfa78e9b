use anyhow::anyhow;
use bakehouse_core::BakehouseError;
use clap::CommandFactory;

use crate::{describe_failure, parse_bakery_spec, Cli, Verb};

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn bakery_spec_accepts_a_full_git_url() {
    let (name, location) =
        parse_bakery_spec("https://github.com/someone/bakehouse-extras").expect("must parse url");
    assert_eq!(name, "someone/extras");
    assert_eq!(location, "https://github.com/someone/bakehouse-extras");
}

#[test]
fn bakery_spec_accepts_owner_repo_shorthand() {
    let (name, location) = parse_bakery_spec("someone/extras").expect("must parse shorthand");
    assert_eq!(name, "someone/extras");
    assert_eq!(location, "https://github.com/someone/extras");
}

#[test]
fn bakery_spec_accepts_a_named_local_path() {
    let (name, location) =
        parse_bakery_spec("local:/srv/bakery").expect("must parse local form");
    assert_eq!(name, "local");
    assert_eq!(location, "/srv/bakery");
}

#[test]
fn bakery_spec_rejects_unrecognized_forms() {
    assert!(parse_bakery_spec("just-a-name").is_none());
    assert!(parse_bakery_spec("https://example.com/short").is_none());
}

#[test]
fn failure_messages_match_the_operation() {
    let not_found: anyhow::Error = BakehouseError::not_found("pkg").into();
    assert_eq!(
        describe_failure("pkg", &not_found, Verb::Install),
        "pkg could not be found."
    );
    assert_eq!(
        describe_failure("pkg", &not_found, Verb::Remove),
        "pkg is not installed."
    );

    let depended: anyhow::Error = BakehouseError::DependedOn {
        package: "pkg".to_string(),
        dependants: vec!["other".to_string()],
    }
    .into();
    assert_eq!(
        describe_failure("pkg", &depended, Verb::Remove),
        "pkg is depended on by 1 package(s): other"
    );

    let tool_missing: anyhow::Error = BakehouseError::UseNotFound("cmake".to_string()).into();
    assert!(describe_failure("pkg", &tool_missing, Verb::Install).contains("`cmake`"));
}

#[test]
fn failure_message_survives_context_wrapping() {
    let err = anyhow::Error::from(BakehouseError::already_installed("pkg"))
        .context("failed installing dependency 'pkg'");
    assert!(describe_failure("pkg", &err, Verb::Install).contains("already installed"));

    let plain = anyhow!("something else broke");
    assert_eq!(
        describe_failure("pkg", &plain, Verb::Install),
        "something else broke"
    );
}
