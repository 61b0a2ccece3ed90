use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context};
use colored::Colorize;
use serde::Serialize;
use strand_repo::{InitOptions, Repository};
use strand_store::{hash_object, EntryMode, Object, ObjectKind, Signature};
use strand_types::ObjectId;
use tracing::debug;

use crate::cli::*;

/// Where the command runs and how it reports.
struct Env {
    cwd: PathBuf,
    format: OutputFormat,
}

impl Env {
    fn repo(&self) -> anyhow::Result<Repository> {
        Repository::discover(&self.cwd, true)?
            .with_context(|| format!("no repository found from {}", self.cwd.display()))
    }

    fn json(&self) -> bool {
        self.format == OutputFormat::Json
    }
}

pub fn run_command(cli: Cli, out: &mut impl Write) -> anyhow::Result<()> {
    let cwd = match cli.directory {
        Some(dir) => dir,
        None => std::env::current_dir().context("cannot read the current directory")?,
    };
    let env = Env {
        cwd,
        format: cli.format,
    };

    debug!(command = cli.command.name(), cwd = %env.cwd.display(), "running command");
    match cli.command {
        Command::Init(args) => cmd_init(&env, args, out),
        Command::HashObject(args) => cmd_hash_object(&env, args, out),
        Command::CatFile(args) => cmd_cat_file(&env, args, out),
        Command::LsTree(args) => cmd_ls_tree(&env, args, out),
        Command::Log(args) => cmd_log(&env, args, out),
        Command::ShowRef(args) => cmd_show_ref(&env, args, out),
        Command::RevParse(args) => cmd_rev_parse(&env, args, out),
        Command::Config(args) => cmd_config(&env, args, out),
    }
}

fn emit_json(out: &mut impl Write, value: &impl Serialize) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

fn cmd_init(env: &Env, args: InitArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let path = env.cwd.join(args.path.unwrap_or_else(|| ".".into()));
    let mut options = InitOptions {
        allow_non_empty: args.allow_non_empty,
        ..Default::default()
    };
    if let Some(branch) = args.initial_branch {
        options.default_branch = branch;
    }
    let repo = Repository::create_with(&path, &options)?;

    #[derive(Serialize)]
    struct Initialized<'a> {
        git_dir: &'a std::path::Path,
        branch: &'a str,
    }
    if env.json() {
        return emit_json(
            out,
            &Initialized {
                git_dir: repo.git_dir(),
                branch: &options.default_branch,
            },
        );
    }
    writeln!(
        out,
        "{} Initialized empty repository in {}",
        "✓".green().bold(),
        repo.git_dir().display().to_string().bold()
    )?;
    writeln!(out, "  Branch: {}", options.default_branch.yellow())?;
    Ok(())
}

fn cmd_hash_object(env: &Env, args: HashObjectArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let path = env.cwd.join(&args.file);
    let data = fs::read(&path).with_context(|| format!("cannot read {}", path.display()))?;
    let kind: ObjectKind = args.kind.parse()?;
    let object = Object::decode(kind, &data)
        .with_context(|| format!("{} is not a valid {kind}", path.display()))?;

    let id = if args.write {
        env.repo()?.write_object(&object, true)?
    } else {
        hash_object(&object)
    };
    writeln!(out, "{id}")?;
    Ok(())
}

fn cmd_cat_file(env: &Env, args: CatFileArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let repo = env.repo()?;
    let kind: ObjectKind = args.kind.parse()?;
    let id = repo.find_object(&args.object)?;
    let id = repo.peel(id, kind)?;
    out.write_all(&repo.read_object(&id)?.serialize())?;
    Ok(())
}

#[derive(Serialize)]
struct TreeRow {
    mode: String,
    kind: ObjectKind,
    id: ObjectId,
    path: String,
}

fn entry_kind(mode: EntryMode) -> ObjectKind {
    match mode {
        EntryMode::Directory => ObjectKind::Tree,
        EntryMode::Gitlink => ObjectKind::Commit,
        EntryMode::Regular | EntryMode::Executable | EntryMode::Symlink => ObjectKind::Blob,
    }
}

fn collect_tree(
    repo: &Repository,
    id: ObjectId,
    prefix: &str,
    recursive: bool,
    rows: &mut Vec<TreeRow>,
) -> anyhow::Result<()> {
    let object = repo.read_object(&id)?;
    let tree = object
        .as_tree()
        .with_context(|| format!("{id} is a {}, not a tree", object.kind()))?;
    for entry in tree {
        let path = if prefix.is_empty() {
            entry.name.clone()
        } else {
            format!("{prefix}/{}", entry.name)
        };
        if recursive && entry.mode.is_tree() {
            collect_tree(repo, entry.object_id, &path, true, rows)?;
            continue;
        }
        rows.push(TreeRow {
            mode: entry.mode.to_string(),
            kind: entry_kind(entry.mode),
            id: entry.object_id,
            path,
        });
    }
    Ok(())
}

fn cmd_ls_tree(env: &Env, args: LsTreeArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let repo = env.repo()?;
    let id = repo.find_object(&args.tree)?;
    let tree_id = repo.peel(id, ObjectKind::Tree)?;

    let mut rows = Vec::new();
    collect_tree(&repo, tree_id, "", args.recursive, &mut rows)?;

    if env.json() {
        return emit_json(out, &rows);
    }
    for row in &rows {
        writeln!(out, "{} {} {}\t{}", row.mode, row.kind, row.id, row.path)?;
    }
    Ok(())
}

#[derive(Serialize)]
struct LogEntry {
    id: ObjectId,
    tree: ObjectId,
    parents: Vec<ObjectId>,
    author: Signature,
    committer: Signature,
    message: String,
}

fn cmd_log(env: &Env, args: LogArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let repo = env.repo()?;
    let start = args.commit.as_deref().unwrap_or("HEAD");
    let id = repo.find_object(start)?;
    let mut next = Some(repo.peel(id, ObjectKind::Commit)?);

    let mut entries = Vec::new();
    while let Some(id) = next {
        if entries.len() >= args.limit {
            break;
        }
        let commit = match repo.read_object(&id)? {
            Object::Commit(commit) => commit,
            other => bail!("{id} is a {}, not a commit", other.kind()),
        };
        next = commit.parents.first().copied();
        entries.push(LogEntry {
            id,
            tree: commit.tree,
            parents: commit.parents,
            author: commit.author,
            committer: commit.committer,
            message: commit.message,
        });
    }

    if env.json() {
        return emit_json(out, &entries);
    }
    for entry in &entries {
        let summary = entry.message.lines().next().unwrap_or("");
        if args.oneline {
            writeln!(out, "{} {}", entry.id.short_hex().yellow(), summary)?;
            continue;
        }
        writeln!(out, "{}", format!("commit {}", entry.id).yellow().bold())?;
        if entry.parents.len() > 1 {
            let parents: Vec<_> = entry.parents.iter().map(ObjectId::short_hex).collect();
            writeln!(out, "Merge: {}", parents.join(" "))?;
        }
        writeln!(out, "Author: {} <{}>", entry.author.name(), entry.author.email())?;
        match entry.author.when() {
            Ok(when) => writeln!(out, "Date:   {}", when.format("%a %b %e %H:%M:%S %Y %z"))?,
            Err(_) => writeln!(out, "Date:   {} {}", entry.author.timestamp(), entry.author.offset())?,
        }
        writeln!(out)?;
        for line in entry.message.lines() {
            writeln!(out, "    {line}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

#[derive(Serialize)]
struct RefRow {
    name: String,
    id: ObjectId,
}

fn cmd_show_ref(env: &Env, args: ShowRefArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let repo = env.repo()?;
    let mut rows = Vec::new();
    if args.head {
        if let Some(id) = repo.resolve_ref("HEAD")? {
            rows.push(RefRow {
                name: "HEAD".into(),
                id,
            });
        }
    }
    rows.extend(
        repo.list_refs()?
            .into_iter()
            .map(|(name, id)| RefRow { name, id }),
    );

    if env.json() {
        return emit_json(out, &rows);
    }
    for row in &rows {
        writeln!(out, "{} {}", row.id, row.name)?;
    }
    Ok(())
}

fn cmd_rev_parse(env: &Env, args: RevParseArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let repo = env.repo()?;
    let id = repo.find_object(&args.name)?;
    if env.json() {
        return emit_json(out, &RefRow { name: args.name, id });
    }
    if args.short {
        writeln!(out, "{}", id.short_hex())?;
    } else {
        writeln!(out, "{id}")?;
    }
    Ok(())
}

fn cmd_config(env: &Env, args: ConfigArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let mut repo = env.repo()?;
    if let Some(value) = args.value {
        repo.set_config(&args.key, value)?;
        return Ok(());
    }

    let Some(value) = repo.config().get(&args.key) else {
        bail!("config key {} is not set", args.key);
    };
    if env.json() {
        #[derive(Serialize)]
        struct Entry<'a> {
            key: &'a str,
            value: &'a str,
        }
        return emit_json(out, &Entry { key: &args.key, value });
    }
    writeln!(out, "{value}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use strand_store::{Blob, Commit, Tree, TreeEntry};

    fn run(dir: &std::path::Path, args: &[&str]) -> anyhow::Result<String> {
        colored::control::set_override(false);
        let base = ["strand", "-C", dir.to_str().unwrap()];
        let cli = Cli::try_parse_from(base.iter().chain(args).copied())?;
        let mut out = Vec::new();
        run_command(cli, &mut out)?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    fn signature(timestamp: i64) -> Signature {
        Signature::new("A U Thor", "author@example.com", timestamp, "+0000").unwrap()
    }

    fn commit_chain(repo: &Repository, messages: &[&str]) -> Vec<ObjectId> {
        let blob = repo
            .write_object(&Object::from(Blob::new(b"hello\n".to_vec())), true)
            .unwrap();
        let tree = Tree::new(vec![TreeEntry::new(EntryMode::Regular, "hello.txt", blob)]).unwrap();
        let tree = repo.write_object(&Object::from(tree), true).unwrap();

        let mut ids: Vec<ObjectId> = Vec::new();
        for (i, message) in messages.iter().enumerate() {
            let parents = ids.last().copied().into_iter().collect();
            let sig = signature(1_700_000_000 + i as i64);
            let commit = Commit::new(tree, parents, sig.clone(), sig, format!("{message}\n"));
            ids.push(repo.write_object(&Object::from(commit), true).unwrap());
        }
        let head = repo.file_path("refs/heads/main", true).unwrap().unwrap();
        fs::write(head, format!("{}\n", ids.last().unwrap())).unwrap();
        ids
    }

    #[test]
    fn init_creates_repository() {
        let dir = tempfile::tempdir().unwrap();
        let output = run(dir.path(), &["init", "proj"]).unwrap();
        assert!(output.contains("Initialized empty repository"));
        assert!(dir.path().join("proj/.git/objects").is_dir());
    }

    #[test]
    fn init_refuses_non_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("file"), "x").unwrap();
        assert!(run(dir.path(), &["init"]).is_err());
        run(dir.path(), &["init", "--allow-non-empty"]).unwrap();
    }

    #[test]
    fn hash_object_write_then_cat_file() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), &["init"]).unwrap();
        fs::write(dir.path().join("hello.txt"), "hello\n").unwrap();

        let dry = run(dir.path(), &["hash-object", "hello.txt"]).unwrap();
        assert_eq!(dry.trim(), "ce013625030ba8dba906f756967f9e9ca394464a");
        assert!(run(dir.path(), &["cat-file", "blob", "ce0136"]).is_err());

        let written = run(dir.path(), &["hash-object", "-w", "hello.txt"]).unwrap();
        assert_eq!(written, dry);
        assert!(dir
            .path()
            .join(".git/objects/ce/013625030ba8dba906f756967f9e9ca394464a")
            .is_file());
        assert_eq!(run(dir.path(), &["cat-file", "blob", "ce0136"]).unwrap(), "hello\n");
    }

    #[test]
    fn hash_object_rejects_malformed_commit() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), &["init"]).unwrap();
        fs::write(dir.path().join("c"), "not a commit").unwrap();
        assert!(run(dir.path(), &["hash-object", "-t", "commit", "c"]).is_err());
        assert!(run(dir.path(), &["hash-object", "-t", "widget", "c"]).is_err());
    }

    #[test]
    fn rev_parse_on_unborn_head_fails() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), &["init"]).unwrap();
        assert!(run(dir.path(), &["rev-parse", "HEAD"]).is_err());
    }

    #[test]
    fn log_walks_first_parents() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::create(dir.path()).unwrap();
        let ids = commit_chain(&repo, &["first", "second", "third"]);

        let output = run(dir.path(), &["log", "--oneline"]).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(
            lines,
            [
                format!("{} third", ids[2].short_hex()),
                format!("{} second", ids[1].short_hex()),
                format!("{} first", ids[0].short_hex()),
            ]
        );

        let limited = run(dir.path(), &["log", "-n", "1"]).unwrap();
        assert!(limited.starts_with(&format!("commit {}", ids[2])));
        assert!(limited.contains("Author: A U Thor <author@example.com>"));
        assert!(limited.contains("    third"));
        assert!(!limited.contains("second"));
    }

    #[test]
    fn ls_tree_and_cat_file_peel_commits() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::create(dir.path()).unwrap();
        commit_chain(&repo, &["only"]);

        let listing = run(dir.path(), &["ls-tree", "main"]).unwrap();
        assert_eq!(
            listing,
            "100644 blob ce013625030ba8dba906f756967f9e9ca394464a\thello.txt\n"
        );
        let tree_payload = run(dir.path(), &["cat-file", "tree", "HEAD"]);
        assert!(tree_payload.is_ok());
    }

    #[test]
    fn ls_tree_recursive() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::create(dir.path()).unwrap();
        let blob = repo
            .write_object(&Object::from(Blob::new(b"x".to_vec())), true)
            .unwrap();
        let inner = Tree::new(vec![TreeEntry::new(EntryMode::Executable, "run.sh", blob)]).unwrap();
        let inner = repo.write_object(&Object::from(inner), true).unwrap();
        let outer = Tree::new(vec![
            TreeEntry::new(EntryMode::Directory, "bin", inner),
            TreeEntry::new(EntryMode::Regular, "a.txt", blob),
        ])
        .unwrap();
        let outer = repo.write_object(&Object::from(outer), true).unwrap();

        let flat = run(dir.path(), &["ls-tree", &outer.to_hex()]).unwrap();
        assert_eq!(
            flat,
            format!("100644 blob {blob}\ta.txt\n040000 tree {inner}\tbin\n")
        );
        let deep = run(dir.path(), &["ls-tree", "-r", &outer.to_hex()]).unwrap();
        assert_eq!(
            deep,
            format!("100644 blob {blob}\ta.txt\n100755 blob {blob}\tbin/run.sh\n")
        );
    }

    #[test]
    fn show_ref_json() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::create(dir.path()).unwrap();
        let ids = commit_chain(&repo, &["one"]);

        let output = run(dir.path(), &["--format", "json", "show-ref", "--head"]).unwrap();
        let rows: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(rows[0]["name"], "HEAD");
        assert_eq!(rows[1]["name"], "refs/heads/main");
        assert_eq!(rows[1]["id"], ids[0].to_hex());
    }

    #[test]
    fn config_get_and_set() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), &["init"]).unwrap();
        assert_eq!(run(dir.path(), &["config", "core.bare"]).unwrap(), "false\n");
        assert!(run(dir.path(), &["config", "user.name"]).is_err());

        run(dir.path(), &["config", "user.name", "A U Thor"]).unwrap();
        assert_eq!(run(dir.path(), &["config", "user.name"]).unwrap(), "A U Thor\n");
    }

    #[test]
    fn commands_outside_repository_fail() {
        let dir = tempfile::tempdir().unwrap();
        let outside = dir.path().join("plain");
        fs::create_dir(&outside).unwrap();
        // A repository further up (e.g. the temp root) would be found; only
        // assert the error when none is.
        if Repository::discover(&outside, false).unwrap().is_none() {
            assert!(run(&outside, &["show-ref"]).is_err());
        }
    }
}
