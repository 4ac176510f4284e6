use git_branches_forge::{ChangeRequestState, Forge, ForgeError, MockForge};

#[test]
fn test_mock_forge_reads_fixture() -> eyre::Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let fixture_path = temp_dir.path().join("pulls.json");
    std::fs::write(
        &fixture_path,
        r#"{
            "feature": [{
                "number": 42,
                "state": "open",
                "html_url": "https://github.com/owner/repo/pull/42",
                "merged_at": null,
                "head": {"sha": "62fc20d2a290daea0d52bdc2ed2ad4be6491010e"},
                "user": {"login": "octocat"}
            }]
        }"#,
    )?;

    let mut forge = MockForge::new(fixture_path);
    let change_request = forge
        .find_change_request("feature")?
        .ok_or_else(|| eyre::eyre!("expected a change request"))?;
    assert_eq!(change_request.number, 42);
    assert_eq!(change_request.state, ChangeRequestState::Open);
    assert_eq!(change_request.author, "octocat");

    // Asking twice gives the same answer.
    assert!(forge.find_change_request("feature")?.is_some());
    assert_eq!(forge.find_change_request("other")?, None);
    Ok(())
}

#[test]
fn test_mock_forge_missing_fixture() -> eyre::Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let mut forge = MockForge::new(temp_dir.path().join("does-not-exist.json"));
    let result = forge.find_change_request("feature");
    assert!(matches!(result, Err(ForgeError::ReadFixture { .. })));
    Ok(())
}
