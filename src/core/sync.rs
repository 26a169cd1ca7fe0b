//! Package collection history synchronization
//!
//! Moves the collection's checkout between commits and reports which
//! packages changed. Rebases and merges may conflict; depending on the
//! failure policy the operator is either handed a shell in the repository
//! to fix things up, or the run stops.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::defaults::{REMOTE_REF, TIP_REF};
use crate::core::versions::VersionCheck;
use crate::error::{GitError, VxbError};

/// How remote changes are brought into the working branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStrategy {
    /// Fast-forward only
    Ff,
    /// Rebase the working branch onto the remote
    Rebase,
    /// Merge the remote into the working branch
    Merge,
}

/// How the checkout is moved to another commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitStrategy {
    /// Detached checkout; failures are fatal
    Checkout,
    /// Rebase the working branch onto the commit
    Rebase,
}

/// What happens when a rebase or merge fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Open an interactive shell so the operator can fix it
    #[default]
    Shell,
    /// Stop immediately
    Die,
}

impl fmt::Display for RemoteStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ff => "ff",
            Self::Rebase => "rebase",
            Self::Merge => "merge",
        })
    }
}

impl fmt::Display for CommitStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Checkout => "checkout",
            Self::Rebase => "rebase",
        })
    }
}

/// Whether the repository is in a usable state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No operation in progress
    Clean,
    /// A rebase or merge stopped and has to be fixed
    ConflictNeedsFix,
}

/// Upstream to synchronize with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    /// Remote name, e.g. `origin`
    pub name: String,
    /// Branch on the remote
    pub branch: String,
}

impl Remote {
    /// Local name of the remote-tracking branch
    pub fn tracking_ref(&self) -> String {
        format!("{}/{}", self.name, self.branch)
    }
}

/// Settings of a synchronization session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Working branch
    pub branch: String,
    /// Upstream, if remotes are enabled
    pub remote: Option<Remote>,
    pub remote_strategy: RemoteStrategy,
    pub commit_strategy: CommitStrategy,
    pub on_failure: FailurePolicy,
    /// Shell sessions allowed per conflict
    pub fix_attempts: u32,
}

/// Version-control operations on the collection's repository
pub trait Vcs {
    /// Repository root
    fn path(&self) -> &Path;

    /// Fetch `branch` from `remote`
    fn fetch(&mut self, remote: &str, branch: &str) -> Result<(), GitError>;

    /// Check out a branch or commit
    fn checkout(&mut self, commit: &str) -> Result<(), GitError>;

    /// Rebase the current branch onto `onto`
    fn rebase(&mut self, onto: &str) -> Result<(), GitError>;

    /// Merge `commit` into the current branch
    fn merge(&mut self, commit: &str, ff_only: bool) -> Result<(), GitError>;

    /// Whether a rebase or merge is waiting to be finished
    fn operation_in_progress(&self) -> bool;
}

/// Gives the operator a chance to repair the repository
pub trait ConflictFixer {
    /// Run an interactive session in `repo` and return its exit code
    ///
    /// `None` means the session was killed by a signal.
    fn fix(&mut self, repo: &Path) -> Result<Option<i32>, GitError>;
}

/// Split a `a...b` range into its commits
///
/// An empty or missing range yields no commits.
pub fn parse_range(range: Option<&str>) -> Vec<String> {
    match range {
        None => Vec::new(),
        Some(range) if range.trim().is_empty() => Vec::new(),
        Some(range) => range.split("...").map(|c| c.trim().to_string()).collect(),
    }
}

/// Synchronization state machine over a repository
#[derive(Debug)]
pub struct GitSync<V, F> {
    vcs: V,
    fixer: F,
    config: SyncConfig,
    state: SyncState,
}

impl<V: Vcs, F: ConflictFixer> GitSync<V, F> {
    /// Create a session for a clean repository
    pub fn new(vcs: V, fixer: F, config: SyncConfig) -> Self {
        Self {
            vcs,
            fixer,
            config,
            state: SyncState::Clean,
        }
    }

    /// Current state
    pub fn state(&self) -> SyncState {
        self.state
    }

    fn remote(&self, action: &str) -> Result<Remote, GitError> {
        self.config
            .remote
            .clone()
            .ok_or_else(|| GitError::RemoteDisabled {
                action: action.to_string(),
            })
    }

    /// Fetch the remote branch
    pub fn fetch(&mut self) -> Result<(), GitError> {
        let remote = self.remote("fetch")?;
        info!("Fetching {} from {}", remote.branch, remote.name);
        self.vcs.fetch(&remote.name, &remote.branch)
    }

    /// Bring the fetched remote branch into the working branch
    pub fn reconcile_remote(&mut self) -> Result<(), GitError> {
        let target = self.remote("reconcile with the remote")?.tracking_ref();
        let strategy = self.config.remote_strategy;
        info!(
            "Reconciling {} with {target} ({strategy})",
            self.config.branch
        );

        let branch = self.config.branch.clone();
        let result = self.vcs.checkout(&branch).and_then(|()| match strategy {
            RemoteStrategy::Ff => self.vcs.merge(&target, true),
            RemoteStrategy::Rebase => self.vcs.rebase(&target),
            RemoteStrategy::Merge => self.vcs.merge(&target, false),
        });

        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                let operation = match strategy {
                    RemoteStrategy::Rebase => "rebasing onto the remote",
                    RemoteStrategy::Ff | RemoteStrategy::Merge => "merging the remote",
                };
                self.recover(operation, e)
            }
        }
    }

    /// Resolve the `tip` and `remote` shorthands
    fn resolve_ref(&self, reference: &str) -> Result<String, GitError> {
        match reference {
            TIP_REF => Ok(self.config.branch.clone()),
            REMOTE_REF => Ok(self.remote("change to the remote")?.tracking_ref()),
            other => Ok(other.to_string()),
        }
    }

    /// Move the checkout to `reference` using the commit strategy
    pub fn change_commit(&mut self, reference: &str) -> Result<(), GitError> {
        let commit = self.resolve_ref(reference)?;
        debug!("Changing to {commit} ({})", self.config.commit_strategy);

        match self.config.commit_strategy {
            CommitStrategy::Checkout => self.vcs.checkout(&commit),
            CommitStrategy::Rebase => {
                let branch = self.config.branch.clone();
                let result = self
                    .vcs
                    .checkout(&branch)
                    .and_then(|()| self.vcs.rebase(&commit));
                match result {
                    Ok(()) => Ok(()),
                    Err(e) => self.recover("rebasing", e),
                }
            }
        }
    }

    /// Handle a failed rebase or merge according to the failure policy
    fn recover(&mut self, operation: &str, cause: GitError) -> Result<(), GitError> {
        self.state = SyncState::ConflictNeedsFix;
        error!("{cause} while {operation}");

        if self.config.on_failure == FailurePolicy::Die {
            return Err(GitError::Conflict {
                operation: operation.to_string(),
                cause: Box::new(cause),
            });
        }

        // At least one shell is always offered
        let attempts = self.config.fix_attempts.max(1);
        for attempt in 1..=attempts {
            info!(
                "Dropping to a shell in {} to fix the problem (attempt {attempt} of {attempts})",
                self.vcs.path().display()
            );
            info!("To stop, exit the shell with a non-zero status");

            let code = self.fixer.fix(self.vcs.path())?;
            if code != Some(0) {
                return Err(GitError::FixAborted {
                    operation: operation.to_string(),
                    code,
                });
            }
            if !self.vcs.operation_in_progress() {
                self.state = SyncState::Clean;
                return Ok(());
            }
            warn!("The repository is still {operation}, try again");
        }

        Err(GitError::FixAttemptsExhausted {
            operation: operation.to_string(),
            attempts,
        })
    }

    /// Packages that need rebuilding between two commits
    ///
    /// With fewer than two commits the remote is fetched and reconciled
    /// first, the range starting at `HEAD` (or the single commit given) and
    /// ending at the remote branch. A starting point other than `HEAD` must
    /// have no outdated packages.
    pub async fn changed<O: VersionCheck>(
        &mut self,
        oracle: &mut O,
        arch: &str,
        commits: &[String],
    ) -> Result<Vec<String>, VxbError> {
        let (from, to) = match commits {
            [] | [_] => {
                let to = self.remote("compare against the remote")?.tracking_ref();
                self.fetch()?;
                self.reconcile_remote()?;
                let from = commits.first().cloned().unwrap_or_else(|| "HEAD".to_string());
                (from, to)
            }
            [from, to] => (from.clone(), to.clone()),
            _ => {
                return Err(GitError::TooManyCommits {
                    count: commits.len(),
                }
                .into())
            }
        };

        if from != "HEAD" {
            self.change_commit(&from)?;
            let baseline = oracle.status(arch).await?;
            if !baseline.is_clean() {
                return Err(GitError::DirtyBaseline {
                    commit: from,
                    packages: baseline.outdated_packages(),
                }
                .into());
            }
        }

        self.change_commit(&to)?;
        let status = oracle.status(arch).await?;
        let changed = status.outdated_packages();
        info!("{} packages changed between {from} and {to}", changed.len());
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::versions::VersionStatus;
    use crate::error::VersionCheckError;
    use std::collections::VecDeque;
    use std::path::PathBuf;

    /// Repository double that logs operations and fails on request
    #[derive(Default)]
    struct FakeVcs {
        log: Vec<String>,
        fail: Vec<String>,
        in_progress: bool,
        path: PathBuf,
    }

    impl FakeVcs {
        fn failing(ops: &[&str]) -> Self {
            Self {
                fail: ops.iter().map(|s| (*s).to_string()).collect(),
                ..Default::default()
            }
        }

        fn record(&mut self, op: String) -> Result<(), GitError> {
            let failed = self.fail.iter().any(|f| op.starts_with(f.as_str()));
            self.log.push(op.clone());
            if failed {
                self.in_progress = true;
                return Err(GitError::Command {
                    command: format!("git {op}"),
                    output: "CONFLICT".to_string(),
                });
            }
            Ok(())
        }
    }

    impl Vcs for FakeVcs {
        fn path(&self) -> &Path {
            &self.path
        }

        fn fetch(&mut self, remote: &str, branch: &str) -> Result<(), GitError> {
            self.record(format!("fetch {remote} {branch}"))
        }

        fn checkout(&mut self, commit: &str) -> Result<(), GitError> {
            self.record(format!("checkout {commit}"))
        }

        fn rebase(&mut self, onto: &str) -> Result<(), GitError> {
            self.record(format!("rebase {onto}"))
        }

        fn merge(&mut self, commit: &str, ff_only: bool) -> Result<(), GitError> {
            let flag = if ff_only { " --ff-only" } else { "" };
            self.record(format!("merge{flag} {commit}"))
        }

        fn operation_in_progress(&self) -> bool {
            self.in_progress
        }
    }

    /// Fixer with scripted exit codes; each run may clear the conflict
    #[derive(Default)]
    struct ScriptedFixer {
        codes: VecDeque<Option<i32>>,
        /// Run after which the conflict is resolved
        resolves_on: Option<usize>,
        runs: usize,
    }

    impl ScriptedFixer {
        fn new(codes: &[Option<i32>], resolves_on: Option<usize>) -> Self {
            Self {
                codes: codes.iter().copied().collect(),
                resolves_on,
                runs: 0,
            }
        }
    }

    /// Pairs the fixer with the fake repository's conflict flag
    struct Session {
        sync: GitSync<SharedVcs, SharedFixer>,
    }

    /// The fixer has to clear the repository's conflict flag, so both share it
    #[derive(Clone, Default)]
    struct Shared(std::rc::Rc<std::cell::RefCell<(FakeVcs, ScriptedFixer)>>);

    struct SharedVcs(Shared, PathBuf);
    struct SharedFixer(Shared);

    impl Vcs for SharedVcs {
        fn path(&self) -> &Path {
            &self.1
        }
        fn fetch(&mut self, remote: &str, branch: &str) -> Result<(), GitError> {
            self.0 .0.borrow_mut().0.fetch(remote, branch)
        }
        fn checkout(&mut self, commit: &str) -> Result<(), GitError> {
            self.0 .0.borrow_mut().0.checkout(commit)
        }
        fn rebase(&mut self, onto: &str) -> Result<(), GitError> {
            self.0 .0.borrow_mut().0.rebase(onto)
        }
        fn merge(&mut self, commit: &str, ff_only: bool) -> Result<(), GitError> {
            self.0 .0.borrow_mut().0.merge(commit, ff_only)
        }
        fn operation_in_progress(&self) -> bool {
            self.0 .0.borrow().0.in_progress
        }
    }

    impl ConflictFixer for SharedFixer {
        fn fix(&mut self, _repo: &Path) -> Result<Option<i32>, GitError> {
            let mut inner = self.0 .0.borrow_mut();
            let (vcs, fixer) = &mut *inner;
            fixer.runs += 1;
            if fixer.resolves_on == Some(fixer.runs) {
                vcs.in_progress = false;
            }
            Ok(fixer.codes.pop_front().unwrap_or(Some(0)))
        }
    }

    impl Session {
        fn new(vcs: FakeVcs, fixer: ScriptedFixer, config: SyncConfig) -> (Self, Shared) {
            let shared = Shared::default();
            *shared.0.borrow_mut() = (vcs, fixer);
            let sync = GitSync::new(
                SharedVcs(shared.clone(), PathBuf::from("/vpkgs")),
                SharedFixer(shared.clone()),
                config,
            );
            (Self { sync }, shared)
        }
    }

    impl Shared {
        fn log(&self) -> Vec<String> {
            self.0.borrow().0.log.clone()
        }

        fn fixer_runs(&self) -> usize {
            self.0.borrow().1.runs
        }
    }

    fn config(policy: FailurePolicy) -> SyncConfig {
        SyncConfig {
            branch: "master".to_string(),
            remote: Some(Remote {
                name: "upstream".to_string(),
                branch: "master".to_string(),
            }),
            remote_strategy: RemoteStrategy::Rebase,
            commit_strategy: CommitStrategy::Rebase,
            on_failure: policy,
            fix_attempts: 3,
        }
    }

    /// Oracle returning a scripted status per call
    struct ScriptedOracle {
        statuses: VecDeque<VersionStatus>,
        calls: usize,
    }

    impl ScriptedOracle {
        fn new(outdated: &[&[&str]]) -> Self {
            Self {
                statuses: outdated
                    .iter()
                    .map(|lines| {
                        VersionStatus::new(
                            Vec::new(),
                            lines.iter().map(|l| (*l).to_string()).collect(),
                        )
                    })
                    .collect(),
                calls: 0,
            }
        }
    }

    impl VersionCheck for ScriptedOracle {
        async fn status(&mut self, _arch: &str) -> Result<VersionStatus, VersionCheckError> {
            self.calls += 1;
            Ok(self.statuses.pop_front().unwrap_or_default())
        }
    }

    fn commits(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_parse_range() {
        assert!(parse_range(None).is_empty());
        assert!(parse_range(Some("")).is_empty());
        assert_eq!(parse_range(Some("abc")), vec!["abc"]);
        assert_eq!(parse_range(Some("abc...def")), vec!["abc", "def"]);
        assert_eq!(parse_range(Some("a...b...c")).len(), 3);
    }

    #[test]
    fn test_die_policy_never_opens_a_shell() {
        let (mut session, shared) = Session::new(
            FakeVcs::failing(&["rebase"]),
            ScriptedFixer::default(),
            config(FailurePolicy::Die),
        );

        let err = session.sync.change_commit("abc123").unwrap_err();
        assert!(matches!(err, GitError::Conflict { .. }));
        assert_eq!(shared.fixer_runs(), 0);
        assert_eq!(session.sync.state(), SyncState::ConflictNeedsFix);
    }

    #[test]
    fn test_shell_policy_rechecks_markers() {
        let (mut session, shared) = Session::new(
            FakeVcs::failing(&["rebase"]),
            ScriptedFixer::new(&[], Some(2)),
            config(FailurePolicy::Shell),
        );

        session.sync.change_commit("abc123").unwrap();
        assert_eq!(shared.fixer_runs(), 2, "first shell left the rebase unfinished");
        assert_eq!(session.sync.state(), SyncState::Clean);
    }

    #[test]
    fn test_nonzero_shell_exit_aborts() {
        let (mut session, shared) = Session::new(
            FakeVcs::failing(&["rebase"]),
            ScriptedFixer::new(&[Some(1)], None),
            config(FailurePolicy::Shell),
        );

        let err = session.sync.change_commit("abc123").unwrap_err();
        assert!(matches!(err, GitError::FixAborted { code: Some(1), .. }));
        assert_eq!(shared.fixer_runs(), 1);
    }

    #[test]
    fn test_fix_attempts_are_bounded() {
        let (mut session, shared) = Session::new(
            FakeVcs::failing(&["rebase"]),
            ScriptedFixer::new(&[], None),
            config(FailurePolicy::Shell),
        );

        let err = session.sync.change_commit("abc123").unwrap_err();
        assert!(matches!(err, GitError::FixAttemptsExhausted { attempts: 3, .. }));
        assert_eq!(shared.fixer_runs(), 3);
    }

    #[test]
    fn test_zero_fix_attempts_still_opens_a_shell() {
        let mut cfg = config(FailurePolicy::Shell);
        cfg.fix_attempts = 0;
        let (mut session, shared) = Session::new(
            FakeVcs::failing(&["rebase"]),
            ScriptedFixer::new(&[], Some(1)),
            cfg,
        );

        session.sync.change_commit("abc123").unwrap();
        assert_eq!(shared.fixer_runs(), 1);
        assert_eq!(session.sync.state(), SyncState::Clean);
    }

    #[test]
    fn test_checkout_failure_is_always_fatal() {
        let mut cfg = config(FailurePolicy::Shell);
        cfg.commit_strategy = CommitStrategy::Checkout;
        let (mut session, shared) =
            Session::new(FakeVcs::failing(&["checkout"]), ScriptedFixer::default(), cfg);

        let err = session.sync.change_commit("abc123").unwrap_err();
        assert!(matches!(err, GitError::Command { .. }));
        assert_eq!(shared.fixer_runs(), 0);
    }

    #[test]
    fn test_tip_and_remote_shorthands() {
        let mut cfg = config(FailurePolicy::Die);
        cfg.commit_strategy = CommitStrategy::Checkout;
        let (mut session, shared) = Session::new(FakeVcs::default(), ScriptedFixer::default(), cfg);

        session.sync.change_commit("tip").unwrap();
        session.sync.change_commit("remote").unwrap();
        assert_eq!(shared.log(), vec!["checkout master", "checkout upstream/master"]);
    }

    #[test]
    fn test_remote_shorthand_needs_remote() {
        let mut cfg = config(FailurePolicy::Die);
        cfg.remote = None;
        let (mut session, _shared) = Session::new(FakeVcs::default(), ScriptedFixer::default(), cfg);

        let err = session.sync.change_commit("remote").unwrap_err();
        assert!(matches!(err, GitError::RemoteDisabled { .. }));
        assert!(matches!(session.sync.fetch(), Err(GitError::RemoteDisabled { .. })));
    }

    #[test]
    fn test_reconcile_fast_forward() {
        let mut cfg = config(FailurePolicy::Die);
        cfg.remote_strategy = RemoteStrategy::Ff;
        let (mut session, shared) = Session::new(FakeVcs::default(), ScriptedFixer::default(), cfg);

        session.sync.reconcile_remote().unwrap();
        assert_eq!(shared.log(), vec!["checkout master", "merge --ff-only upstream/master"]);
    }

    #[tokio::test]
    async fn test_changed_without_commits_uses_remote() {
        let (mut session, shared) = Session::new(
            FakeVcs::default(),
            ScriptedFixer::default(),
            config(FailurePolicy::Die),
        );
        let mut oracle = ScriptedOracle::new(&[&["foo 1.0_1 1.1_1", "bar 2_1 3_1"]]);

        let changed = session.sync.changed(&mut oracle, "x86_64", &[]).await.unwrap();
        assert_eq!(changed, vec!["foo", "bar"]);
        assert_eq!(oracle.calls, 1, "baseline is not checked when starting at HEAD");
        assert_eq!(
            shared.log(),
            vec![
                "fetch upstream master",
                "checkout master",
                "rebase upstream/master",
                "checkout master",
                "rebase upstream/master",
            ]
        );
    }

    #[tokio::test]
    async fn test_changed_between_two_commits_checks_baseline() {
        let (mut session, shared) = Session::new(
            FakeVcs::default(),
            ScriptedFixer::default(),
            config(FailurePolicy::Die),
        );
        let mut oracle = ScriptedOracle::new(&[&[], &["foo 1 2"]]);

        let changed = session
            .sync
            .changed(&mut oracle, "x86_64", &commits(&["aaa", "bbb"]))
            .await
            .unwrap();
        assert_eq!(changed, vec!["foo"]);
        assert_eq!(oracle.calls, 2);
        assert!(!shared.log().iter().any(|op| op.starts_with("fetch")));
    }

    #[tokio::test]
    async fn test_dirty_baseline_is_fatal() {
        let (mut session, _shared) = Session::new(
            FakeVcs::default(),
            ScriptedFixer::default(),
            config(FailurePolicy::Die),
        );
        let mut oracle = ScriptedOracle::new(&[&["stale 1 2"]]);

        let err = session
            .sync
            .changed(&mut oracle, "x86_64", &commits(&["aaa", "bbb"]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VxbError::Git(GitError::DirtyBaseline { ref packages, .. }) if packages == &vec!["stale".to_string()]
        ));
    }

    #[tokio::test]
    async fn test_too_many_commits() {
        let (mut session, _shared) = Session::new(
            FakeVcs::default(),
            ScriptedFixer::default(),
            config(FailurePolicy::Die),
        );
        let mut oracle = ScriptedOracle::new(&[]);

        let err = session
            .sync
            .changed(&mut oracle, "x86_64", &commits(&["a", "b", "c"]))
            .await
            .unwrap_err();
        assert!(matches!(err, VxbError::Git(GitError::TooManyCommits { count: 3 })));
        assert_eq!(oracle.calls, 0);
    }

    #[tokio::test]
    async fn test_single_commit_without_remote_is_an_error() {
        let mut cfg = config(FailurePolicy::Die);
        cfg.remote = None;
        let (mut session, _shared) = Session::new(FakeVcs::default(), ScriptedFixer::default(), cfg);
        let mut oracle = ScriptedOracle::new(&[]);

        let err = session
            .sync
            .changed(&mut oracle, "x86_64", &commits(&["aaa"]))
            .await
            .unwrap_err();
        assert!(matches!(err, VxbError::Git(GitError::RemoteDisabled { .. })));
    }
}
