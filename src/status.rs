//! Sync status of a namesake and the rules that compute it.
//!
//! [`classify`] is a pure function of one local notebook, the remote
//! revisions observed for its name this cycle and the number of
//! repositories taking part. It never looks at other namesakes.

use serde::Serialize;

use crate::models::{BookView, VersionedRook};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    NoChange,

    BookWithoutLinkAndOneOrMoreRooksExist,
    DummyWithoutLinkAndMultipleRooks,
    NoBookMultipleRooks,
    OnlyBookWithoutLinkAndMultipleRepos,
    BookWithLinkAndRookExistsButLinkPointingToDifferentRook,
    ConflictBothBookAndRookModified,
    ConflictBookWithLinkAndRookButNeverSyncedBefore,
    ConflictLastSyncedRookAndLatestRookAreDifferent,
    RookAndVrookHaveDifferentRepos,
    OnlyDummy,
    BookWithPreviousErrorAndNoLink,

    RookNoLongerExists,

    NoBookOneRook,
    DummyWithoutLinkAndOneRook,

    DummyWithLink,
    BookWithLinkAndRookModified,

    OnlyBookWithoutLinkAndOneRepo,

    BookWithLinkLocalModified,
    OnlyBookWithLink,
}

/// What the dispatcher does for a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFamily {
    NoOp,
    Error,
    Vanished,
    /// Pull the only observed rook.
    LoadOnly,
    /// Pull the rook in the linked repository.
    LoadViaLink,
    /// Link to the only repository, then push.
    SaveOnly,
    /// Push to the linked repository.
    SaveViaLink,
}

impl SyncStatus {
    pub fn family(self) -> StatusFamily {
        use SyncStatus::*;
        match self {
            NoChange => StatusFamily::NoOp,
            BookWithoutLinkAndOneOrMoreRooksExist
            | DummyWithoutLinkAndMultipleRooks
            | NoBookMultipleRooks
            | OnlyBookWithoutLinkAndMultipleRepos
            | BookWithLinkAndRookExistsButLinkPointingToDifferentRook
            | ConflictBothBookAndRookModified
            | ConflictBookWithLinkAndRookButNeverSyncedBefore
            | ConflictLastSyncedRookAndLatestRookAreDifferent
            | RookAndVrookHaveDifferentRepos
            | OnlyDummy
            | BookWithPreviousErrorAndNoLink => StatusFamily::Error,
            RookNoLongerExists => StatusFamily::Vanished,
            NoBookOneRook | DummyWithoutLinkAndOneRook => StatusFamily::LoadOnly,
            DummyWithLink | BookWithLinkAndRookModified => StatusFamily::LoadViaLink,
            OnlyBookWithoutLinkAndOneRepo => StatusFamily::SaveOnly,
            BookWithLinkLocalModified | OnlyBookWithLink => StatusFamily::SaveViaLink,
        }
    }

    /// Message without an argument.
    pub fn msg(self) -> String {
        self.msg_with("")
    }

    /// Message; `arg` is the uri or repository url where one applies.
    pub fn msg_with(self, arg: &str) -> String {
        use SyncStatus::*;
        match self {
            NoChange => "No change".to_string(),
            BookWithoutLinkAndOneOrMoreRooksExist => {
                "Notebook has no link and one or more remote notebooks with the same name exist"
                    .to_string()
            }
            DummyWithoutLinkAndMultipleRooks => {
                "Notebook has no link and multiple remote notebooks with the same name exist"
                    .to_string()
            }
            NoBookMultipleRooks => {
                "No notebook and multiple remote notebooks with the same name exist".to_string()
            }
            OnlyBookWithoutLinkAndMultipleRepos => {
                "Notebook has no link and multiple repositories exist".to_string()
            }
            BookWithLinkAndRookExistsButLinkPointingToDifferentRook => {
                "Notebook has link and remote notebook with the same name exists, \
                 but link is pointing to a different remote notebook"
                    .to_string()
            }
            ConflictBothBookAndRookModified => {
                "Both local and remote notebook have been modified".to_string()
            }
            ConflictBookWithLinkAndRookButNeverSyncedBefore => {
                "Link and remote notebook exist but notebook hasn't been synced before".to_string()
            }
            ConflictLastSyncedRookAndLatestRookAreDifferent => {
                "Last synced notebook and latest remote notebook differ".to_string()
            }
            RookAndVrookHaveDifferentRepos => {
                "Linked repository and last synced notebook's repository differ".to_string()
            }
            OnlyDummy => "Only local dummy exists".to_string(),
            BookWithPreviousErrorAndNoLink => {
                "Notebook has no link and previous sync failed".to_string()
            }
            RookNoLongerExists => "Remote notebook no longer exists".to_string(),
            NoBookOneRook | DummyWithoutLinkAndOneRook | DummyWithLink
            | BookWithLinkAndRookModified => format!("Loaded from {}", arg),
            OnlyBookWithoutLinkAndOneRepo | BookWithLinkLocalModified | OnlyBookWithLink => {
                format!("Saved to {}", arg)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub status: SyncStatus,
    /// The observed rook living in the notebook's linked repository.
    pub latest_linked_rook: Option<VersionedRook>,
}

impl Classification {
    fn of(status: SyncStatus) -> Self {
        Self {
            status,
            latest_linked_rook: None,
        }
    }
}

pub fn classify(
    book: Option<&BookView>,
    rooks: &[VersionedRook],
    repos_count: usize,
) -> Classification {
    use SyncStatus::*;

    let Some(book) = book else {
        return Classification::of(match rooks.len() {
            0 => OnlyDummy,
            1 => NoBookOneRook,
            _ => NoBookMultipleRooks,
        });
    };

    if rooks.is_empty() {
        let status = if book.has_link() && book.has_sync() {
            RookNoLongerExists
        } else if book.is_dummy() {
            OnlyDummy
        } else if book.has_link() {
            OnlyBookWithLink
        } else if repos_count > 1 {
            OnlyBookWithoutLinkAndMultipleRepos
        } else {
            OnlyBookWithoutLinkAndOneRepo
        };
        return Classification::of(status);
    }

    let latest_linked_rook = book
        .link_repo
        .as_ref()
        .and_then(|repo| rooks.iter().find(|r| r.repo_uri == repo.url))
        .cloned();

    if book.is_dummy() {
        if book.has_link() {
            return match latest_linked_rook {
                Some(rook) => Classification {
                    status: DummyWithLink,
                    latest_linked_rook: Some(rook),
                },
                None => Classification::of(BookWithLinkAndRookExistsButLinkPointingToDifferentRook),
            };
        }
        return Classification::of(if rooks.len() == 1 {
            DummyWithoutLinkAndOneRook
        } else {
            DummyWithoutLinkAndMultipleRooks
        });
    }

    if !book.has_link() {
        return Classification::of(if book.last_action_was_error() {
            BookWithPreviousErrorAndNoLink
        } else {
            BookWithoutLinkAndOneOrMoreRooksExist
        });
    }

    let Some(synced) = book.synced_to.as_ref() else {
        return Classification::of(ConflictBookWithLinkAndRookButNeverSyncedBefore);
    };

    let Some(latest) = latest_linked_rook else {
        return Classification::of(BookWithLinkAndRookExistsButLinkPointingToDifferentRook);
    };

    let status = if synced.repo_uri != latest.repo_uri {
        RookAndVrookHaveDifferentRepos
    } else if synced.uri != latest.uri {
        ConflictLastSyncedRookAndLatestRookAreDifferent
    } else if synced.revision == latest.revision {
        if book.is_modified() {
            BookWithLinkLocalModified
        } else {
            NoChange
        }
    } else if book.is_modified() {
        ConflictBothBookAndRookModified
    } else {
        BookWithLinkAndRookModified
    };

    Classification {
        status,
        latest_linked_rook: Some(latest),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Book, BookAction, Repo, RepoType};

    fn repo(id: i64, url: &str) -> Repo {
        Repo {
            id,
            repo_type: RepoType::Directory,
            url: url.to_string(),
        }
    }

    fn rook(repo: &Repo, path: &str, revision: &str) -> VersionedRook {
        VersionedRook {
            repo_id: repo.id,
            repo_type: repo.repo_type,
            repo_uri: repo.url.clone(),
            uri: format!("{}/{}", repo.url, path),
            revision: revision.to_string(),
            mtime: 0,
        }
    }

    fn book(is_dummy: bool, is_modified: bool) -> BookView {
        BookView {
            book: Book {
                id: 1,
                name: "todo".to_string(),
                content: String::new(),
                is_modified,
                is_dummy,
                last_action: None,
            },
            link_repo: None,
            synced_to: None,
        }
    }

    fn linked(mut view: BookView, repo: &Repo, synced: Option<VersionedRook>) -> BookView {
        view.link_repo = Some(repo.clone());
        view.synced_to = synced;
        view
    }

    fn status(book: Option<&BookView>, rooks: &[VersionedRook], repos: usize) -> SyncStatus {
        classify(book, rooks, repos).status
    }

    #[test]
    fn test_no_book() {
        let a = repo(1, "file:///a");
        assert_eq!(status(None, &[rook(&a, "todo.org", "1")], 1), SyncStatus::NoBookOneRook);
        assert_eq!(
            status(None, &[rook(&a, "todo.org", "1"), rook(&a, "todo.md", "2")], 1),
            SyncStatus::NoBookMultipleRooks
        );
    }

    #[test]
    fn test_zero_rooks() {
        let a = repo(1, "file:///a");
        let synced = rook(&a, "todo.org", "1");

        assert_eq!(status(Some(&book(true, false)), &[], 1), SyncStatus::OnlyDummy);
        assert_eq!(
            status(Some(&book(false, false)), &[], 1),
            SyncStatus::OnlyBookWithoutLinkAndOneRepo
        );
        assert_eq!(
            status(Some(&book(false, false)), &[], 2),
            SyncStatus::OnlyBookWithoutLinkAndMultipleRepos
        );
        assert_eq!(
            status(Some(&linked(book(false, true), &a, None)), &[], 1),
            SyncStatus::OnlyBookWithLink
        );
        assert_eq!(
            status(Some(&linked(book(false, false), &a, Some(synced.clone()))), &[], 1),
            SyncStatus::RookNoLongerExists
        );
        // A linked placeholder whose revision vanished is unlinked as well.
        assert_eq!(
            status(Some(&linked(book(true, false), &a, Some(synced))), &[], 1),
            SyncStatus::RookNoLongerExists
        );
    }

    #[test]
    fn test_dummy_with_rooks() {
        let a = repo(1, "file:///a");
        let b = repo(2, "file:///b");
        let ra = rook(&a, "todo.org", "1");
        let rb = rook(&b, "todo.org", "2");

        assert_eq!(
            status(Some(&book(true, false)), &[ra.clone()], 2),
            SyncStatus::DummyWithoutLinkAndOneRook
        );
        assert_eq!(
            status(Some(&book(true, false)), &[ra.clone(), rb.clone()], 2),
            SyncStatus::DummyWithoutLinkAndMultipleRooks
        );

        let result = classify(
            Some(&linked(book(true, false), &b, None)),
            &[ra.clone(), rb.clone()],
            2,
        );
        assert_eq!(result.status, SyncStatus::DummyWithLink);
        assert_eq!(result.latest_linked_rook, Some(rb));

        assert_eq!(
            status(Some(&linked(book(true, false), &b, None)), &[ra], 2),
            SyncStatus::BookWithLinkAndRookExistsButLinkPointingToDifferentRook
        );
    }

    #[test]
    fn test_unlinked_book_with_rooks() {
        let a = repo(1, "file:///a");
        let rooks = [rook(&a, "todo.org", "1")];
        let mut view = book(false, false);
        assert_eq!(
            status(Some(&view), &rooks, 1),
            SyncStatus::BookWithoutLinkAndOneOrMoreRooksExist
        );
        view.book.last_action = Some(BookAction::error("earlier failure"));
        assert_eq!(
            status(Some(&view), &rooks, 1),
            SyncStatus::BookWithPreviousErrorAndNoLink
        );
    }

    #[test]
    fn test_linked_book_with_rooks() {
        let a = repo(1, "file:///a");
        let b = repo(2, "file:///b");
        let synced = rook(&a, "todo.org", "1");

        let never_synced = linked(book(false, false), &a, None);
        assert_eq!(
            status(Some(&never_synced), &[synced.clone()], 1),
            SyncStatus::ConflictBookWithLinkAndRookButNeverSyncedBefore
        );

        let pointing_elsewhere = linked(book(false, false), &b, Some(rook(&b, "todo.org", "1")));
        assert_eq!(
            status(Some(&pointing_elsewhere), &[synced.clone()], 2),
            SyncStatus::BookWithLinkAndRookExistsButLinkPointingToDifferentRook
        );

        let other_repo_sync = linked(book(false, false), &a, Some(rook(&b, "todo.org", "1")));
        assert_eq!(
            status(Some(&other_repo_sync), &[synced.clone()], 2),
            SyncStatus::RookAndVrookHaveDifferentRepos
        );

        let other_uri = linked(book(false, false), &a, Some(rook(&a, "todo.md", "1")));
        assert_eq!(
            status(Some(&other_uri), &[synced.clone()], 1),
            SyncStatus::ConflictLastSyncedRookAndLatestRookAreDifferent
        );
    }

    #[test]
    fn test_revision_comparison() {
        let a = repo(1, "file:///a");
        let synced = rook(&a, "todo.org", "1");
        let same = [synced.clone()];
        let changed = [rook(&a, "todo.org", "2")];

        let clean = linked(book(false, false), &a, Some(synced.clone()));
        let dirty = linked(book(false, true), &a, Some(synced));

        assert_eq!(status(Some(&clean), &same, 1), SyncStatus::NoChange);
        assert_eq!(
            status(Some(&dirty), &same, 1),
            SyncStatus::BookWithLinkLocalModified
        );
        assert_eq!(
            status(Some(&clean), &changed, 1),
            SyncStatus::BookWithLinkAndRookModified
        );
        assert_eq!(
            status(Some(&dirty), &changed, 1),
            SyncStatus::ConflictBothBookAndRookModified
        );

        let result = classify(Some(&clean), &changed, 1);
        assert_eq!(result.latest_linked_rook, Some(changed[0].clone()));
    }

    #[test]
    fn test_messages_carry_argument() {
        assert_eq!(SyncStatus::NoChange.msg(), "No change");
        assert_eq!(
            SyncStatus::NoBookOneRook.msg_with("file:///a/todo.org"),
            "Loaded from file:///a/todo.org"
        );
        assert_eq!(
            SyncStatus::OnlyBookWithLink.msg_with("file:///a"),
            "Saved to file:///a"
        );
        assert_eq!(SyncStatus::RookNoLongerExists.family(), StatusFamily::Vanished);
    }
}
