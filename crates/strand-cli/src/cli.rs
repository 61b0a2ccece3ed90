use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "strand",
    about = "strand: a Git-compatible content-addressed object store",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Run as if started in this directory
    #[arg(short = 'C', long = "directory", global = true)]
    pub directory: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an empty repository
    Init(InitArgs),
    /// Compute an object id, optionally storing the object
    HashObject(HashObjectArgs),
    /// Print the payload of an object
    CatFile(CatFileArgs),
    /// List the entries of a tree
    LsTree(LsTreeArgs),
    /// Show commit history along first parents
    Log(LogArgs),
    /// List refs and the objects they point at
    ShowRef(ShowRefArgs),
    /// Resolve a name to an object id
    RevParse(RevParseArgs),
    /// Get or set a repository config value
    Config(ConfigArgs),
}

impl Command {
    /// Subcommand name as typed on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Init(_) => "init",
            Command::HashObject(_) => "hash-object",
            Command::CatFile(_) => "cat-file",
            Command::LsTree(_) => "ls-tree",
            Command::Log(_) => "log",
            Command::ShowRef(_) => "show-ref",
            Command::RevParse(_) => "rev-parse",
            Command::Config(_) => "config",
        }
    }
}

#[derive(Args)]
pub struct InitArgs {
    pub path: Option<PathBuf>,
    /// Branch HEAD points at
    #[arg(short = 'b', long = "initial-branch")]
    pub initial_branch: Option<String>,
    /// Allow initializing inside a non-empty directory
    #[arg(long)]
    pub allow_non_empty: bool,
}

#[derive(Args)]
pub struct HashObjectArgs {
    pub file: PathBuf,
    /// Store the object
    #[arg(short, long)]
    pub write: bool,
    /// Object type of the file contents
    #[arg(short = 't', long = "type", default_value = "blob")]
    pub kind: String,
}

#[derive(Args)]
pub struct CatFileArgs {
    /// Expected object type; tags and commits are peeled towards it
    pub kind: String,
    pub object: String,
}

#[derive(Args)]
pub struct LsTreeArgs {
    pub tree: String,
    /// Recurse into subtrees
    #[arg(short, long)]
    pub recursive: bool,
}

#[derive(Args)]
pub struct LogArgs {
    pub commit: Option<String>,
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
    #[arg(long)]
    pub oneline: bool,
}

#[derive(Args)]
pub struct ShowRefArgs {
    /// Include HEAD
    #[arg(long)]
    pub head: bool,
}

#[derive(Args)]
pub struct RevParseArgs {
    pub name: String,
    /// Abbreviate the id
    #[arg(long)]
    pub short: bool,
}

#[derive(Args)]
pub struct ConfigArgs {
    pub key: String,
    pub value: Option<String>,
}
