//! Target classification
//!
//! Turns the raw string a caller hands us into exactly one [`BuildTarget`]
//! variant. The decision order is fixed and never backtracks: forced image >
//! git URL > existing local directory > `name[:tag]` image reference >
//! command line. Pure apart from filesystem existence checks.

use crate::error::{StevedoreError, StevedoreResult};
use std::path::{Path, PathBuf};

/// Head tokens that look like `name:tag` to the colon heuristic but are
/// always commands.
const COMMAND_KEYWORDS: &[&str] = &[
    "npx", "npm", "node", "uvx", "uv", "pip", "pip3", "python", "python3", "yarn", "pnpm",
    "cargo", "deno", "bun",
];

/// A classified build target. Exactly one variant per invocation, immutable
/// once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildTarget {
    /// An existing container image reference, run as-is
    Image { reference: String },
    /// A command line to auto-containerize
    Command { argv: Vec<String> },
    /// A local project directory
    LocalDirectory { path: PathBuf },
    /// A remote git repository, optionally pinned to a ref via `#ref`
    GitRepository { url: String, git_ref: Option<String> },
}

impl BuildTarget {
    /// Short stage descriptor used in image names and cache descriptors
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Image { .. } => "image",
            Self::Command { .. } => "command",
            Self::LocalDirectory { .. } => "local",
            Self::GitRepository { .. } => "git",
        }
    }
}

/// Classify a raw target string plus trailing arguments.
///
/// `force_direct` short-circuits everything and treats the input as an image
/// reference. Trailing `args` only matter for the `Command` variant, where
/// they are appended to the tokenized input.
pub fn classify(input: &str, args: &[String], force_direct: bool) -> StevedoreResult<BuildTarget> {
    let input = input.trim();

    if force_direct {
        return Ok(BuildTarget::Image {
            reference: input.to_string(),
        });
    }

    if is_git_url(input) {
        let (url, git_ref) = split_git_ref(input);
        return Ok(BuildTarget::GitRepository { url, git_ref });
    }

    let path = Path::new(input);
    if path.is_dir() {
        return Ok(BuildTarget::LocalDirectory {
            path: path.to_path_buf(),
        });
    }

    if looks_like_image_reference(input) {
        return Ok(BuildTarget::Image {
            reference: input.to_string(),
        });
    }

    let mut argv = tokenize(input)?;
    if argv.is_empty() {
        return Err(StevedoreError::Classification(input.to_string()));
    }
    argv.extend(args.iter().cloned());
    Ok(BuildTarget::Command { argv })
}

/// Check if the given string matches the git URL grammar
pub fn is_git_url(input: &str) -> bool {
    let bare = input.split('#').next().unwrap_or(input);
    bare.starts_with("https://")
        || bare.starts_with("http://")
        || bare.starts_with("ssh://")
        || is_scp_like(bare)
        || bare.contains("github.com")
        || bare.contains("gitlab.com")
        || bare.contains("bitbucket.org")
        || bare.ends_with(".git")
}

/// `git@host:path` style URLs
fn is_scp_like(input: &str) -> bool {
    match input.split_once('@') {
        Some((user, rest)) => {
            !user.is_empty() && !user.contains('/') && rest.contains(':') && !rest.contains("://")
        }
        None => false,
    }
}

fn split_git_ref(input: &str) -> (String, Option<String>) {
    match input.split_once('#') {
        Some((url, r)) if !r.is_empty() => (url.to_string(), Some(r.to_string())),
        _ => (input.to_string(), None),
    }
}

/// The `name[:tag]` heuristic: a colon in tag position, no path separators
/// resolving on disk, no whitespace, and a head token that is not a known
/// command keyword.
fn looks_like_image_reference(input: &str) -> bool {
    if input.contains(char::is_whitespace) {
        return false;
    }
    let Some((name, tag)) = input.rsplit_once(':') else {
        return false;
    };
    if name.is_empty() || tag.is_empty() || tag.contains('/') {
        return false;
    }
    let head = name.split('/').next().unwrap_or(name);
    if COMMAND_KEYWORDS.contains(&head.to_ascii_lowercase().as_str()) {
        return false;
    }
    // `./dir:something` or an existing path is not an image
    !Path::new(input).exists() && !name.starts_with('.')
}

/// Tokenize a command line, preserving quoted groups as single arguments.
///
/// Unbalanced quoting is the only fatal classification failure.
fn tokenize(input: &str) -> StevedoreResult<Vec<String>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in input.chars() {
        match (ch, quote) {
            ('"', None) | ('\'', None) => quote = Some(ch),
            (c, Some(q)) if c == q => quote = None,
            (c, None) if c.is_whitespace() => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            (c, _) => current.push(c),
        }
    }

    if quote.is_some() {
        return Err(StevedoreError::UnbalancedQuotes(input.to_string()));
    }
    if !current.is_empty() {
        parts.push(current);
    }
    Ok(parts)
}
