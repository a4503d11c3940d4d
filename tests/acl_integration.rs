mod support;

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;

use indexgate::acl::Decision;
use indexgate::acl::collaborators::Collaborators;
use indexgate::acl::rules::AVAILABLE_GROUPS_HEADER;
use indexgate::cli::Cli;
use indexgate::fixture::{CommittedRequest, StaticRequest};
use indexgate::settings::Settings;
use indexgate::{build_acl, evaluate_fixture};
use support::*;

fn request(body: &str) -> StaticRequest {
    StaticRequest::parse(body).expect("valid request fixture")
}

fn standard_acl() -> String {
    AclBuilder::new()
        .user("alice", "wonder", &["admins", "ops"])
        .user("bob", "builder", &["dev"])
        .block(BlockSpec::allow("admins").groups(&["admins"]))
        .block(BlockSpec::forbid("no-secrets").indices(&["secret*"]))
        .block(
            BlockSpec::allow("readers")
                .hosts(&["10.0.0.0/8"])
                .indices(&["logs-*", "metrics"]),
        )
        .render()
}

fn build(dirs: &TestDirs, acl: &str) -> Result<indexgate::acl::Acl> {
    write_acl(dirs, acl)?;
    build_acl(&default_test_settings(dirs), &Collaborators::default())
}

#[tokio::test]
async fn first_matching_block_decides() -> Result<()> {
    let dirs = TestDirs::new()?;
    let acl = build(&dirs, &standard_acl())?;

    let admin = request(&format!(
        r#"
        id = "admin-1"
        remote_address = "192.168.1.1"
        indices = ["secret-plans"]
        universe = ["secret-plans"]

        [headers]
        authorization = "{}"
        "#,
        basic_auth("alice", "wonder")
    ));
    let outcome = acl.check(&admin).await;
    assert_eq!(outcome.decision, Decision::Allow);
    assert_eq!(outcome.block.as_deref(), Some("admins"));
    assert_eq!(outcome.history.len(), 1);

    let reader = request(
        r#"
        id = "reader-1"
        remote_address = "10.1.1.1"
        indices = ["secret-plans"]
        universe = ["secret-plans", "logs-1"]
        "#,
    );
    let outcome = acl.check(&reader).await;
    assert_eq!(outcome.decision, Decision::Forbid);
    assert_eq!(outcome.block.as_deref(), Some("no-secrets"));
    assert!(outcome.mutations.is_none());
    assert_eq!(
        outcome.history_string(),
        "[admins->[groups->false]], [no-secrets->[indices->true]]"
    );
    Ok(())
}

#[tokio::test]
async fn allowed_request_commits_narrowed_indices() -> Result<()> {
    let dirs = TestDirs::new()?;
    let acl = build(&dirs, &standard_acl())?;

    let wide = request(
        r#"
        id = "wide-1"
        remote_address = "10.2.3.4"
        indices = ["_all"]
        universe = ["logs-1", "logs-2", "metrics", "audit"]
        "#,
    );
    let outcome = acl.check(&wide).await;
    assert_eq!(outcome.decision, Decision::Allow);
    assert_eq!(outcome.block.as_deref(), Some("readers"));

    let mut committed = CommittedRequest::default();
    assert!(outcome.commit(&mut committed));
    let expected: BTreeSet<String> = ["logs-1", "logs-2", "metrics"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(committed.indices, Some(expected));
    Ok(())
}

#[tokio::test]
async fn nothing_permitted_is_forbidden() -> Result<()> {
    let dirs = TestDirs::new()?;
    let acl = build(
        &dirs,
        &AclBuilder::new()
            .block(BlockSpec::allow("a-only").indices(&["a*"]))
            .render(),
    )?;

    let outcome = acl
        .check(&request(
            r#"
            indices = ["zzz"]
            universe = ["zzz", "abc"]
            "#,
        ))
        .await;
    assert_eq!(outcome.decision, Decision::Forbid);
    assert!(outcome.block.is_none());
    assert!(!outcome.authentication_required);
    assert!(outcome.mutations.is_none());
    Ok(())
}

#[tokio::test]
async fn missing_credentials_ask_for_authentication() -> Result<()> {
    let dirs = TestDirs::new()?;
    let acl = build(
        &dirs,
        &AclBuilder::new()
            .block(BlockSpec::allow("service").auth_key("svc", "s3cret"))
            .render(),
    )?;

    let anonymous = request("id = \"anon\"");
    let outcome = acl.check(&anonymous).await;
    assert_eq!(outcome.decision, Decision::Forbid);
    assert!(outcome.authentication_required);

    let authenticated = request(&format!(
        "[headers]\nauthorization = \"{}\"\n",
        basic_auth("svc", "s3cret")
    ));
    let outcome = acl.check(&authenticated).await;
    assert_eq!(outcome.decision, Decision::Allow);
    assert_eq!(outcome.logged_user().map(|u| u.id.as_str()), Some("svc"));
    Ok(())
}

#[tokio::test]
async fn rewrite_uses_logged_user() -> Result<()> {
    let dirs = TestDirs::new()?;
    let acl = build(
        &dirs,
        &AclBuilder::new()
            .user("carol", "pw", &["kibana"])
            .block(
                BlockSpec::allow("kibana")
                    .groups(&["kibana"])
                    .indices_rewrite(&["^\\.kibana$", ".kibana_@{user}"]),
            )
            .render(),
    )?;

    let outcome = acl
        .check(&request(&format!(
            r#"
            indices = [".kibana"]

            [headers]
            authorization = "{}"
            "#,
            basic_auth("carol", "pw")
        )))
        .await;
    assert_eq!(outcome.decision, Decision::Allow);

    let mut committed = CommittedRequest::default();
    outcome.commit(&mut committed);
    assert_eq!(
        committed.indices,
        Some([".kibana_carol".to_string()].into_iter().collect())
    );
    assert_eq!(
        committed.response_headers.get(AVAILABLE_GROUPS_HEADER).map(String::as_str),
        Some("kibana")
    );
    assert_eq!(
        committed.logged_user.and_then(|u| u.current_group),
        Some("kibana".to_string())
    );
    Ok(())
}

#[tokio::test]
async fn quiet_blocks_skip_allowed_audit_entries() -> Result<()> {
    let capture = LogCapture::new("info").await;
    let dirs = TestDirs::new()?;
    let acl = build(
        &dirs,
        &AclBuilder::new()
            .block(BlockSpec::allow("health").quiet().actions(&["cluster:monitor/*"]))
            .block(BlockSpec::allow("logs").indices(&["logs-*"]))
            .render(),
    )?;

    acl.check(&request(
        r#"
        id = "quiet-health"
        action = "cluster:monitor/health"
        "#,
    ))
    .await;
    acl.check(&request(
        r#"
        id = "loud-logs"
        indices = ["logs-1"]
        universe = ["logs-1"]
        "#,
    ))
    .await;
    acl.check(&request(
        r#"
        id = "loud-denied"
        indices = ["other"]
        universe = ["other"]
        "#,
    ))
    .await;

    let lines = capture.audit_lines();
    assert!(
        !lines.iter().any(|l| l.contains("quiet-health")),
        "quiet allow was audit-logged: {lines:?}"
    );
    let logs = lines
        .iter()
        .find(|l| l.contains("loud-logs"))
        .expect("audit entry for allowed request");
    assert!(logs.contains("decision=\"ALLOW\""), "{logs}");
    assert!(logs.contains("block=\"logs\""), "{logs}");
    let denied = lines
        .iter()
        .find(|l| l.contains("loud-denied"))
        .expect("audit entry for denied request");
    assert!(denied.contains("decision=\"FORBID\""), "{denied}");
    Ok(())
}

#[tokio::test]
async fn invalid_acl_is_rejected_at_load() -> Result<()> {
    let dirs = TestDirs::new()?;
    let err = build(
        &dirs,
        "[[block]]\nname = \"broken\"\nindices = [\"a\"]\nindeces = [\"b\"]\n",
    )
    .unwrap_err();
    assert!(format!("{err:#}").contains("indeces"), "{err:#}");

    let err = build(
        &dirs,
        "[[block]]\nname = \"authz\"\nldap_authorization = { directory = \"corp\", groups = [\"g\"] }\n",
    )
    .unwrap_err();
    assert!(
        format!("{err:#}").contains("no authentication rule"),
        "{err:#}"
    );
    Ok(())
}

#[tokio::test]
async fn eval_command_reports_decision() -> Result<()> {
    let dirs = TestDirs::new()?;
    write_acl(&dirs, &standard_acl())?;
    let config = dirs.write_settings("")?;
    let request_path = dirs.write_request(
        "request.toml",
        r#"
        id = "eval-1"
        remote_address = "10.9.9.9"
        indices = ["logs-*"]
        universe = ["logs-1", "logs-2", "secret"]
        "#,
    )?;
    let cli = Cli {
        config: Some(config),
        command: None,
    };
    let settings = Settings::load(&cli)?;
    let report = evaluate_fixture(&settings, &request_path).await?;

    assert_eq!(report.request_id, "eval-1");
    assert_eq!(report.decision, Decision::Allow);
    assert_eq!(report.block.as_deref(), Some("readers"));
    let json = serde_json::to_value(&report)?;
    assert_eq!(json["decision"], "ALLOW");
    assert_eq!(json["history"].as_array().map(Vec::len), Some(3));
    Ok(())
}

#[tokio::test]
async fn snapshot_is_shared_across_tasks() -> Result<()> {
    let dirs = TestDirs::new()?;
    let acl = Arc::new(build(&dirs, &standard_acl())?);

    let mut handles = Vec::new();
    for n in 0..8 {
        let acl = acl.clone();
        handles.push(tokio::spawn(async move {
            let req = request(&format!(
                "id = \"parallel-{n}\"\nremote_address = \"10.0.0.{n}\"\nindices = [\"logs-{n}\"]\nuniverse = [\"logs-{n}\"]\n"
            ));
            acl.check(&req).await.decision
        }));
    }
    for handle in handles {
        assert_eq!(handle.await?, Decision::Allow);
    }
    Ok(())
}
