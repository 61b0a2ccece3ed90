//! Locating, opening, and creating repositories.
//!
//! A repository is a working tree plus its metadata directory `<worktree>/.git`:
//!
//! ```text
//! .git/
//!   HEAD            ref: refs/heads/main
//!   config          core.repositoryformatversion = 0, ...
//!   description
//!   branches/
//!   objects/        loose object store
//!   refs/heads/
//!   refs/tags/
//! ```

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use strand_store::{LooseObjectStore, Object};
use strand_types::ObjectId;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{RepoError, RepoResult};
use crate::refs::validate_ref_name;

/// Name of the metadata directory inside a working tree.
pub const GIT_DIR: &str = ".git";

/// Branch `HEAD` points at in a freshly created repository.
pub const DEFAULT_BRANCH: &str = "main";

/// Contents of `description` in a freshly created repository.
pub const DEFAULT_DESCRIPTION: &str =
    "Unnamed repository; edit this file 'description' to name the repository.\n";

/// Options for [`Repository::create_with`].
#[derive(Clone, Debug)]
pub struct InitOptions {
    /// Reuse a non-empty working tree, as long as it has no metadata directory.
    pub allow_non_empty: bool,
    /// Branch name written to `HEAD`.
    pub default_branch: String,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            allow_non_empty: false,
            default_branch: DEFAULT_BRANCH.to_string(),
        }
    }
}

/// An opened repository. Holds paths and the parsed config; objects and refs
/// are always read from disk.
#[derive(Clone, Debug)]
pub struct Repository {
    worktree: PathBuf,
    git_dir: PathBuf,
    config: Config,
    objects: LooseObjectStore,
}

impl Repository {
    /// Open the repository whose working tree is `worktree`.
    ///
    /// Fails with [`RepoError::NotARepository`] if there is no metadata
    /// directory, and with a config error if the config is missing, corrupt,
    /// or declares a format other than 0.
    pub fn open(worktree: impl AsRef<Path>) -> RepoResult<Self> {
        let worktree = worktree.as_ref();
        let worktree = fs::canonicalize(worktree).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => RepoError::NotARepository {
                path: worktree.to_path_buf(),
            },
            _ => RepoError::io(worktree, e),
        })?;
        let git_dir = worktree.join(GIT_DIR);
        if !git_dir.is_dir() {
            return Err(RepoError::NotARepository { path: worktree });
        }

        let config_path = git_dir.join("config");
        let config = Config::load(&config_path)?;
        config.validate().map_err(|e| e.at_path(&config_path))?;

        debug!(worktree = %worktree.display(), "opened repository");
        Ok(Self {
            objects: LooseObjectStore::new(git_dir.join("objects")),
            worktree,
            git_dir,
            config,
        })
    }

    /// Walk from `start` towards the filesystem root and open the first
    /// directory that contains a metadata directory.
    ///
    /// Returns `Ok(None)` when nothing is found and `required` is false.
    pub fn discover(start: impl AsRef<Path>, required: bool) -> RepoResult<Option<Self>> {
        let start = start.as_ref();
        let start = fs::canonicalize(start).map_err(|e| RepoError::io(start, e))?;

        let mut current = start.as_path();
        loop {
            if current.join(GIT_DIR).is_dir() {
                return Self::open(current).map(Some);
            }
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }

        if required {
            Err(RepoError::NotARepository { path: start })
        } else {
            Ok(None)
        }
    }

    /// Create a repository at `path` with default options.
    pub fn create(path: impl AsRef<Path>) -> RepoResult<Self> {
        Self::create_with(path, &InitOptions::default())
    }

    /// Create a repository at `path`.
    ///
    /// The path must not exist, or be an empty directory (any directory
    /// without `.git` when `allow_non_empty` is set). Nothing is written
    /// until those checks pass.
    pub fn create_with(path: impl AsRef<Path>, options: &InitOptions) -> RepoResult<Self> {
        let path = path.as_ref();
        validate_ref_name(&format!("refs/heads/{}", options.default_branch))?;

        let conflict = |reason: &str| RepoError::PathConflict {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        match fs::metadata(path) {
            Ok(meta) if !meta.is_dir() => return Err(conflict("exists and is not a directory")),
            Ok(_) => {
                if path.join(GIT_DIR).exists() {
                    return Err(conflict("already contains a repository"));
                }
                let mut listing = fs::read_dir(path).map_err(|e| RepoError::io(path, e))?;
                if !options.allow_non_empty && listing.next().is_some() {
                    return Err(conflict("directory is not empty"));
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                fs::create_dir_all(path).map_err(|e| RepoError::io(path, e))?;
            }
            Err(e) => return Err(RepoError::io(path, e)),
        }

        let worktree = fs::canonicalize(path).map_err(|e| RepoError::io(path, e))?;
        let git_dir = worktree.join(GIT_DIR);
        let repo = Self {
            objects: LooseObjectStore::new(git_dir.join("objects")),
            config: Config::default_config(),
            worktree,
            git_dir,
        };

        for dir in ["branches", "objects", "refs/tags", "refs/heads"] {
            repo.subdir(dir, true)?;
        }
        repo.write_file("description", DEFAULT_DESCRIPTION)?;
        repo.write_file(
            "HEAD",
            &format!("ref: refs/heads/{}\n", options.default_branch),
        )?;
        repo.config.save(&repo.path("config"))?;

        info!(
            worktree = %repo.worktree.display(),
            branch = %options.default_branch,
            "initialized empty repository"
        );
        Ok(repo)
    }

    /// The working tree root.
    pub fn worktree(&self) -> &Path {
        &self.worktree
    }

    /// The metadata directory, `<worktree>/.git`.
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The loose object store under `.git/objects`.
    pub fn objects(&self) -> &LooseObjectStore {
        &self.objects
    }

    /// Join `rel` onto the metadata directory. Touches nothing.
    pub fn path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.git_dir.join(rel)
    }

    /// Resolve a directory under the metadata directory.
    ///
    /// Returns the path if it exists. If it is absent, creates it when `mkdir`
    /// is set and returns `None` otherwise. Fails with
    /// [`RepoError::NotADirectory`] if any component exists as a non-directory.
    pub fn subdir(&self, rel: impl AsRef<Path>, mkdir: bool) -> RepoResult<Option<PathBuf>> {
        let rel = rel.as_ref();
        let mut walked = self.git_dir.clone();
        let mut missing = false;
        for component in rel.components() {
            match component {
                Component::Normal(part) => walked.push(part),
                Component::CurDir => continue,
                _ => {
                    return Err(RepoError::InvalidRef {
                        name: rel.display().to_string(),
                        reason: "path escapes the metadata directory".into(),
                    })
                }
            }
            if missing {
                continue;
            }
            match fs::metadata(&walked) {
                Ok(meta) if meta.is_dir() => {}
                Ok(_) => return Err(RepoError::NotADirectory { path: walked }),
                Err(e) if e.kind() == io::ErrorKind::NotFound => missing = true,
                Err(e) => return Err(RepoError::io(&walked, e)),
            }
        }

        if !missing {
            return Ok(Some(walked));
        }
        if !mkdir {
            return Ok(None);
        }
        fs::create_dir_all(&walked).map_err(|e| RepoError::io(&walked, e))?;
        Ok(Some(walked))
    }

    /// Resolve a file path under the metadata directory, ensuring (or, with
    /// `mkdir`, creating) its parent directory. Returns `None` when the parent
    /// is absent and `mkdir` is false. The file itself need not exist.
    pub fn file_path(&self, rel: impl AsRef<Path>, mkdir: bool) -> RepoResult<Option<PathBuf>> {
        let rel = rel.as_ref();
        let parent = rel.parent().unwrap_or_else(|| Path::new(""));
        Ok(self.subdir(parent, mkdir)?.map(|_| self.path(rel)))
    }

    fn write_file(&self, rel: &str, contents: &str) -> RepoResult<()> {
        let path = self
            .file_path(rel, true)?
            .unwrap_or_else(|| self.path(rel));
        fs::write(&path, contents).map_err(|e| RepoError::io(&path, e))
    }

    /// Read and decode an object from the loose store.
    pub fn read_object(&self, id: &ObjectId) -> RepoResult<Object> {
        Ok(self.objects.read_object(id)?)
    }

    /// Hash an object and, if `persist` is set, store it.
    pub fn write_object(&self, object: &Object, persist: bool) -> RepoResult<ObjectId> {
        Ok(self.objects.write_object(object, persist)?)
    }

    /// Set a config value and write the config file back atomically.
    pub fn set_config(&mut self, key: &str, value: impl Into<String>) -> RepoResult<()> {
        self.config.set(key, value)?;
        self.config.save(&self.path("config"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_store::{Blob, ObjectKind, StoreError};

    fn tmp() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn create_writes_layout() {
        let dir = tmp();
        let repo = Repository::create(dir.path().join("proj")).unwrap();
        let git = repo.git_dir();
        for sub in ["branches", "objects", "refs/tags", "refs/heads"] {
            assert!(git.join(sub).is_dir(), "{sub}");
        }
        assert_eq!(fs::read_to_string(git.join("HEAD")).unwrap(), "ref: refs/heads/main\n");
        assert_eq!(
            fs::read_to_string(git.join("description")).unwrap(),
            DEFAULT_DESCRIPTION
        );
        let config = Config::load(&git.join("config")).unwrap();
        assert_eq!(config.get("core.repositoryformatversion"), Some("0"));
        assert_eq!(config.get("core.filemode"), Some("false"));
        assert_eq!(config.get("core.bare"), Some("false"));
    }

    #[test]
    fn create_in_empty_directory() {
        let dir = tmp();
        let repo = Repository::create(dir.path()).unwrap();
        assert_eq!(repo.worktree(), fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn create_with_custom_branch() {
        let dir = tmp();
        let options = InitOptions {
            default_branch: "trunk".into(),
            ..Default::default()
        };
        let repo = Repository::create_with(dir.path(), &options).unwrap();
        assert_eq!(
            fs::read_to_string(repo.path("HEAD")).unwrap(),
            "ref: refs/heads/trunk\n"
        );
    }

    #[test]
    fn create_rejects_bad_branch_name() {
        let dir = tmp();
        let options = InitOptions {
            default_branch: "bad..name".into(),
            ..Default::default()
        };
        assert!(matches!(
            Repository::create_with(dir.path(), &options),
            Err(RepoError::InvalidRef { .. })
        ));
        assert!(!dir.path().join(GIT_DIR).exists());
    }

    #[test]
    fn create_rejects_non_empty_directory() {
        let dir = tmp();
        fs::write(dir.path().join("README"), "hi").unwrap();
        assert!(matches!(
            Repository::create(dir.path()),
            Err(RepoError::PathConflict { .. })
        ));
        assert!(!dir.path().join(GIT_DIR).exists());
    }

    #[test]
    fn create_non_empty_when_allowed() {
        let dir = tmp();
        fs::write(dir.path().join("README"), "hi").unwrap();
        let options = InitOptions {
            allow_non_empty: true,
            ..Default::default()
        };
        Repository::create_with(dir.path(), &options).unwrap();
        assert!(dir.path().join(GIT_DIR).join("HEAD").is_file());
    }

    #[test]
    fn create_rejects_existing_repository() {
        let dir = tmp();
        Repository::create(dir.path()).unwrap();
        let options = InitOptions {
            allow_non_empty: true,
            ..Default::default()
        };
        assert!(matches!(
            Repository::create_with(dir.path(), &options),
            Err(RepoError::PathConflict { .. })
        ));
    }

    #[test]
    fn create_rejects_file() {
        let dir = tmp();
        let file = dir.path().join("file");
        fs::write(&file, "x").unwrap();
        assert!(matches!(
            Repository::create(&file),
            Err(RepoError::PathConflict { .. })
        ));
    }

    #[test]
    fn discover_walks_up() {
        let dir = tmp();
        let created = Repository::create(dir.path()).unwrap();
        let deep = dir.path().join("a/b/c");
        fs::create_dir_all(&deep).unwrap();

        let found = Repository::discover(&deep, true).unwrap().unwrap();
        assert_eq!(found.worktree(), created.worktree());
        assert_eq!(found.git_dir(), created.git_dir());
    }

    #[test]
    fn discover_from_worktree_itself() {
        let dir = tmp();
        Repository::create(dir.path()).unwrap();
        assert!(Repository::discover(dir.path(), true).unwrap().is_some());
    }

    #[test]
    fn discover_nearest_wins() {
        let dir = tmp();
        Repository::create(dir.path()).unwrap();
        let inner = dir.path().join("sub");
        let inner_repo = Repository::create(&inner).unwrap();
        let found = Repository::discover(inner.join(".git/refs"), true).unwrap().unwrap();
        assert_eq!(found.worktree(), inner_repo.worktree());
    }

    #[test]
    fn discover_without_repository_reaches_root() {
        let dir = tmp();
        let deep = dir.path().join("x/y");
        fs::create_dir_all(&deep).unwrap();
        // Skip when the temp dir itself sits inside some repository.
        if Repository::discover(&deep, false).unwrap().is_some() {
            return;
        }
        match Repository::discover(&deep, true) {
            Err(RepoError::NotARepository { path }) => {
                assert_eq!(path, fs::canonicalize(&deep).unwrap())
            }
            other => panic!("expected NotARepository, got {other:?}"),
        }
    }

    #[test]
    fn rejected_config_key_leaves_repository_openable() {
        let dir = tmp();
        let mut repo = Repository::create(dir.path()).unwrap();
        for key in ["nodot", "user.bad key"] {
            assert!(matches!(
                repo.set_config(key, "x"),
                Err(RepoError::InvalidConfigKey { .. })
            ));
        }
        repo.set_config("user.name", "A U Thor").unwrap();
        let reopened = Repository::open(dir.path()).unwrap();
        assert_eq!(reopened.config().get("user.name"), Some("A U Thor"));
    }

    #[test]
    fn open_rejects_future_format() {
        let dir = tmp();
        let mut repo = Repository::create(dir.path()).unwrap();
        repo.set_config("core.repositoryformatversion", "1").unwrap();
        match Repository::open(dir.path()) {
            Err(RepoError::UnsupportedFormatVersion { path, found }) => {
                assert_eq!(found, 1);
                assert_eq!(path, repo.path("config"));
            }
            other => panic!("expected UnsupportedFormatVersion, got {other:?}"),
        }
    }

    #[test]
    fn open_without_config_is_corrupt() {
        let dir = tmp();
        let repo = Repository::create(dir.path()).unwrap();
        fs::remove_file(repo.path("config")).unwrap();
        assert!(matches!(
            Repository::open(dir.path()),
            Err(RepoError::ConfigCorrupt { .. })
        ));
    }

    #[test]
    fn open_plain_directory_fails() {
        let dir = tmp();
        assert!(matches!(
            Repository::open(dir.path()),
            Err(RepoError::NotARepository { .. })
        ));
    }

    #[test]
    fn subdir_and_file_path() {
        let dir = tmp();
        let repo = Repository::create(dir.path()).unwrap();

        assert_eq!(repo.subdir("refs/heads", false).unwrap(), Some(repo.path("refs/heads")));
        assert_eq!(repo.subdir("refs/remotes/origin", false).unwrap(), None);
        assert!(!repo.path("refs/remotes").exists());

        let made = repo.subdir("refs/remotes/origin", true).unwrap().unwrap();
        assert!(made.is_dir());

        assert_eq!(repo.file_path("logs/HEAD", false).unwrap(), None);
        let log = repo.file_path("logs/HEAD", true).unwrap().unwrap();
        assert!(log.parent().unwrap().is_dir());
        assert!(!log.exists());
        assert_eq!(repo.file_path("HEAD", false).unwrap(), Some(repo.path("HEAD")));
    }

    #[test]
    fn subdir_through_file_fails() {
        let dir = tmp();
        let repo = Repository::create(dir.path()).unwrap();
        assert!(matches!(
            repo.subdir("HEAD", false),
            Err(RepoError::NotADirectory { .. })
        ));
        assert!(matches!(
            repo.file_path("HEAD/x", true),
            Err(RepoError::NotADirectory { .. })
        ));
    }

    #[test]
    fn subdir_rejects_escape() {
        let dir = tmp();
        let repo = Repository::create(dir.path()).unwrap();
        assert!(repo.subdir("../outside", true).is_err());
    }

    #[test]
    fn objects_roundtrip_through_repository() {
        let dir = tmp();
        let repo = Repository::create(dir.path()).unwrap();
        let blob = Object::from(Blob::new(b"hello\n".to_vec()));

        let id = repo.write_object(&blob, true).unwrap();
        assert_eq!(id.to_hex(), "ce013625030ba8dba906f756967f9e9ca394464a");
        assert!(repo
            .git_dir()
            .join("objects/ce/013625030ba8dba906f756967f9e9ca394464a")
            .is_file());

        let back = repo.read_object(&id).unwrap();
        assert_eq!(back.kind(), ObjectKind::Blob);
        assert_eq!(back, blob);
    }

    #[test]
    fn hash_only_write_leaves_store_untouched() {
        let dir = tmp();
        let repo = Repository::create(dir.path()).unwrap();
        let id = repo
            .write_object(&Object::from(Blob::new(b"not stored".to_vec())), false)
            .unwrap();
        assert!(matches!(
            repo.read_object(&id),
            Err(RepoError::Store(StoreError::ObjectNotFound { .. }))
        ));
    }
}
