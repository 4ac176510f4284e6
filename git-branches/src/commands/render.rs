//! Drawing the branch table.

use cursive_core::theme::{BaseColor, Effect, Style};
use cursive_core::utils::markup::StyledString;
use git_branches_forge::{ChangeRequest, ChangeRequestState};
use itertools::Itertools;
use lib::core::formatting::{styled_string_width, Glyphs};
use lib::git::short_sha;

use super::gather::{BranchRow, SyncStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Justify {
    Left,
    Right,
}

const COLUMNS: &[(&str, Justify)] = &[
    ("Origin", Justify::Right),
    ("Local", Justify::Left),
    ("Age", Justify::Right),
    ("<-", Justify::Right),
    ("->", Justify::Left),
    ("Branch", Justify::Left),
    ("Base", Justify::Left),
    ("PR", Justify::Left),
];

const COLUMN_SEPARATOR: &str = "  ";

/// Index of the `PR` column, whose cell links to the change request.
const CHANGE_REQUEST_COLUMN: usize = 7;

fn local_sha_style() -> Style {
    BaseColor::Blue.light().into()
}

fn current_branch_style() -> Style {
    BaseColor::Green.light().into()
}

fn change_request_state_style(state: ChangeRequestState) -> Style {
    match state {
        ChangeRequestState::Open => BaseColor::Green.light().into(),
        ChangeRequestState::Closed => BaseColor::Red.light().into(),
        ChangeRequestState::Merged => BaseColor::Magenta.light().into(),
    }
}

fn foreign_author_marker(glyphs: &Glyphs, is_foreign: bool) -> StyledString {
    if is_foreign {
        StyledString::styled(glyphs.foreign_author, BaseColor::Red.light())
    } else {
        StyledString::plain(" ")
    }
}

fn render_origin(glyphs: &Glyphs, row: &BranchRow) -> StyledString {
    let mut result = foreign_author_marker(glyphs, row.remote_foreign_author);
    let remote_sha = row.remote_sha.as_deref().map(short_sha).unwrap_or_default();
    match row.sync_status {
        SyncStatus::NotPushed => {}
        SyncStatus::Synced => result.append_styled(remote_sha, local_sha_style()),
        SyncStatus::Unsynced {
            remote_is_newer: Some(true),
        } => result.append_styled(remote_sha, Effect::Bold),
        SyncStatus::Unsynced {
            remote_is_newer: Some(false),
        } => result.append_styled(remote_sha, Effect::Dim),
        SyncStatus::Unsynced {
            remote_is_newer: None,
        } => result.append_plain(remote_sha),
    }
    result
}

fn render_local(glyphs: &Glyphs, row: &BranchRow) -> StyledString {
    let mut result = StyledString::styled(short_sha(&row.local_sha), local_sha_style());
    result.append(foreign_author_marker(glyphs, row.local_foreign_author));
    result
}

fn render_count(row: &BranchRow, count: usize) -> StyledString {
    if row.is_current {
        StyledString::styled(count.to_string(), current_branch_style())
    } else {
        StyledString::plain(count.to_string())
    }
}

fn render_change_request(row: &BranchRow, change_request: &ChangeRequest) -> StyledString {
    let ChangeRequest {
        number,
        state,
        head_sha,
        url: _,
        author,
        merged_at: _,
    } = change_request;
    let mut result = StyledString::styled(
        format!("#{number}"),
        change_request_state_style(*state),
    );
    result.append_plain(" (");
    if head_sha == &row.local_sha {
        result.append_styled(short_sha(head_sha), local_sha_style());
    } else {
        result.append_plain(short_sha(head_sha));
    }
    result.append_plain(format!(") by {author}"));
    result
}

fn render_row(glyphs: &Glyphs, row: &BranchRow) -> Vec<StyledString> {
    let mut ahead = render_count(row, row.ahead);
    if row.has_merge_commit {
        ahead.append_plain(" ");
        ahead.append_styled(glyphs.merge_commit, BaseColor::Yellow.dark());
    }
    let branch = if row.is_current {
        StyledString::styled(row.branch.as_str(), current_branch_style())
    } else {
        StyledString::plain(row.branch.as_str())
    };

    vec![
        render_origin(glyphs, row),
        render_local(glyphs, row),
        StyledString::styled(row.age_days.to_string(), local_sha_style()),
        render_count(row, row.behind),
        ahead,
        branch,
        row.base
            .as_ref()
            .map(|base| StyledString::plain(base.as_str()))
            .unwrap_or_else(StyledString::new),
        row.change_request
            .as_ref()
            .map(|change_request| render_change_request(row, change_request))
            .unwrap_or_else(StyledString::new),
    ]
}

fn pad(cell: String, cell_width: usize, width: usize, justify: Justify) -> String {
    let padding = " ".repeat(width.saturating_sub(cell_width));
    match justify {
        Justify::Left => cell + &padding,
        Justify::Right => padding + &cell,
    }
}

/// Render the table of branches, one line per row plus a header and a rule.
pub fn render_branch_table(glyphs: &Glyphs, rows: &[BranchRow]) -> eyre::Result<Vec<String>> {
    let header = COLUMNS
        .iter()
        .map(|(title, _)| StyledString::plain(*title))
        .collect_vec();
    let body = rows.iter().map(|row| render_row(glyphs, row)).collect_vec();

    let widths = COLUMNS
        .iter()
        .enumerate()
        .map(|(index, _)| {
            std::iter::once(&header)
                .chain(body.iter())
                .map(|cells| styled_string_width(&cells[index]))
                .max()
                .unwrap_or_default()
        })
        .collect_vec();
    let rule = widths
        .iter()
        .map(|width| StyledString::plain(glyphs.table_rule.repeat(*width)))
        .collect_vec();
    let links = [None, None].into_iter().chain(rows.iter().map(|row| {
        row.change_request
            .as_ref()
            .map(|change_request| change_request.url.as_str())
    }));

    let mut lines = Vec::new();
    for (cells, link) in std::iter::once(header)
        .chain(std::iter::once(rule))
        .chain(body)
        .zip(links)
    {
        let mut line = String::new();
        for (index, ((cell, width), (_, justify))) in
            cells.into_iter().zip(&widths).zip(COLUMNS).enumerate()
        {
            if index > 0 {
                line.push_str(COLUMN_SEPARATOR);
            }
            let cell_width = styled_string_width(&cell);
            let rendered = glyphs.render(cell)?;
            let rendered = match link {
                Some(url) if index == CHANGE_REQUEST_COLUMN => glyphs.hyperlink(&rendered, url),
                _ => rendered,
            };
            line.push_str(&pad(rendered, cell_width, *width, *justify));
        }
        lines.push(line.trim_end().to_owned());
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use lib::core::rewrite::CommitRef;

    use super::*;

    fn row(branch: &str) -> BranchRow {
        BranchRow {
            branch: branch.to_string(),
            is_current: false,
            local_sha: "62fc20d2a290daea0d52bdc2ed2ad4be6491010e".to_string(),
            remote_sha: None,
            sync_status: SyncStatus::NotPushed,
            local_foreign_author: false,
            remote_foreign_author: false,
            has_merge_commit: false,
            age_days: 3,
            behind: 0,
            ahead: 0,
            base: None,
            change_request: None,
        }
    }

    #[test]
    fn test_render_branch_table() -> eyre::Result<()> {
        let main = BranchRow {
            remote_sha: Some("62fc20d2a290daea0d52bdc2ed2ad4be6491010e".to_string()),
            sync_status: SyncStatus::Synced,
            age_days: 12,
            ..row("main")
        };
        let feature = BranchRow {
            is_current: true,
            local_sha: "96d1c37a3d4363611c49f7e52186e189a04c531f".to_string(),
            remote_sha: Some("f0a3bd6d2b7e2f4e6f8a1c2b3d4e5f60718293a4".to_string()),
            sync_status: SyncStatus::Unsynced {
                remote_is_newer: Some(false),
            },
            local_foreign_author: true,
            behind: 1,
            ahead: 2,
            change_request: Some(ChangeRequest {
                number: 42,
                state: ChangeRequestState::Open,
                head_sha: "96d1c37a3d4363611c49f7e52186e189a04c531f".to_string(),
                url: "https://github.com/owner/repo/pull/42".to_string(),
                author: "octocat".to_string(),
                merged_at: None,
            }),
            ..row("feature")
        };
        let stacked = BranchRow {
            local_sha: "4838e49b08954becdd17c0900c1179c2c654c627".to_string(),
            has_merge_commit: true,
            behind: 1,
            ahead: 3,
            base: Some(CommitRef::from("feature")),
            ..row("stacked")
        };

        let lines = render_branch_table(&Glyphs::text(), &[main, feature, stacked])?;
        insta::assert_snapshot!(lines.join("\n"), @r###"
        Origin  Local   Age  <-  ->   Branch   Base     PR
        ------  ------  ---  --  ---  -------  -------  ----------------------
         62fc2  62fc2    12   0  0    main
         f0a3b  96d1c!    3   1  2    feature           #42 (96d1c) by octocat
                4838e     3   1  3 M  stacked  feature
        "###);
        Ok(())
    }

    #[test]
    fn test_change_request_links_when_colored() -> eyre::Result<()> {
        let feature = BranchRow {
            change_request: Some(ChangeRequest {
                number: 7,
                state: ChangeRequestState::Merged,
                head_sha: "62fc20d2a290daea0d52bdc2ed2ad4be6491010e".to_string(),
                url: "https://github.com/owner/repo/pull/7".to_string(),
                author: "octocat".to_string(),
                merged_at: Some("2020-10-30T00:00:00Z".to_string()),
            }),
            ..row("feature")
        };

        let pretty = render_branch_table(&Glyphs::pretty(), &[feature.clone()])?;
        assert!(pretty[2].contains("\x1b]8;;https://github.com/owner/repo/pull/7\x1b\\"));
        assert!(pretty[2].ends_with("\x1b]8;;\x1b\\"));

        let text = render_branch_table(&Glyphs::text(), &[feature])?;
        assert!(!text[2].contains("https://"));
        assert!(text[2].ends_with("#7 (62fc2) by octocat"));
        Ok(())
    }
}
