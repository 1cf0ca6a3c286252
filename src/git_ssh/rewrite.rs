//! # Remote Base Rewriting
//!
//! Line-oriented rewrite of kustomization files so that each annotated remote
//! base reaches its host through a per-key SSH alias.
//!
//! ## Grammar
//!
//! Two tokens are recognised:
//!
//! - **Annotation**: a whole-line `#` comment containing `<marker>:` followed by
//!   optional blanks and a key alias (`[A-Za-z0-9_]+`, anything else is a parse
//!   error). The marker must start the comment or follow whitespace, `#` or `:`.
//!   Any other comment text around it is ignored.
//! - **Remote URL**: a list item `- <url>` where `<url>` is one of
//!   - `ssh://host/path`
//!   - `ssh://host:port/path`
//!   - `ssh://user@host/path`, `ssh://user@host:port/path`
//!   - `ssh://user@host:path`
//!   - `user@host:path`
//!
//!   with `host` matching `[A-Za-z0-9][A-Za-z0-9.-]*`.
//!
//! ## States
//!
//! | State | Input | Next |
//! |-------|-------|------|
//! | `Idle` | annotation | `KeyPending(alias)` |
//! | `Idle` | anything else | `Idle`, line copied |
//! | `KeyPending` | annotation | `KeyPending(new alias)` |
//! | `KeyPending` | remote URL | `Idle`, host replaced by `<alias>_<host with . as _>` |
//! | `KeyPending` | remote URL on a host other than the one the alias is bound to | parse error |
//! | `KeyPending` | anything else | parse error |
//! | `KeyPending` | end of file | parse error |

use crate::error::{PluginError, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;

/// Rewrites annotated remote base URLs for one marker token
#[derive(Debug, Clone)]
pub struct RepoBaseRewriter {
    annotation: Regex,
}

#[derive(Debug)]
enum State {
    Idle,
    KeyPending { alias: String, line: usize },
}

impl RepoBaseRewriter {
    /// Build a rewriter recognising annotations that use `marker`
    pub fn new(marker: &str) -> Result<Self> {
        if marker.trim().is_empty() {
            return Err(PluginError::Config(
                "plugin key marker must not be empty".to_string(),
            ));
        }
        let pattern = format!(
            r"^\s*#(?:.*[\s#:])?{}:[ \t]*(?P<alias>[^\s#,]+)",
            regex::escape(marker.trim())
        );
        let annotation = Regex::new(&pattern)
            .map_err(|e| PluginError::Config(format!("invalid plugin key marker {marker:?}: {e}")))?;
        Ok(Self { annotation })
    }

    /// Rewrite `content` (read from `path`) and return the aliases it bound
    ///
    /// Returns the alias to real host map alongside the rewritten text. The text
    /// is newline-normalised; callers should leave the file alone when the map
    /// is empty.
    pub fn update_repo_base_addresses(
        &self,
        content: &str,
        path: &Path,
    ) -> Result<(BTreeMap<String, String>, String)> {
        let mut keyed_domains = BTreeMap::new();
        let (_, out) = self.rewrite_into(content, path, &mut keyed_domains)?;
        Ok((keyed_domains, out))
    }

    /// Rewrite `content`, binding aliases into `keyed_domains`, which may
    /// already hold bindings from other files
    ///
    /// Returns the number of URLs rewritten. An alias bound to two different
    /// hosts is a parse error.
    pub(crate) fn rewrite_into(
        &self,
        content: &str,
        path: &Path,
        keyed_domains: &mut BTreeMap<String, String>,
    ) -> Result<(usize, String)> {
        let mut out = String::with_capacity(content.len() + 64);
        let mut state = State::Idle;
        let mut rewritten = 0;

        for (index, line) in content.lines().enumerate() {
            let line_no = index + 1;

            if let Some(alias) = self.annotation_alias(line, path, line_no)? {
                state = State::KeyPending {
                    alias: alias.to_string(),
                    line: line_no,
                };
                push_line(&mut out, line);
                continue;
            }

            match std::mem::replace(&mut state, State::Idle) {
                State::Idle => push_line(&mut out, line),
                State::KeyPending { alias, .. } => {
                    let Some(remote) = RemoteLine::parse(line) else {
                        return Err(PluginError::Parse {
                            path: path.to_path_buf(),
                            line: line_no,
                            message: format!(
                                "found key reference '{alias}' in comment but the next line is not an SSH remote base url"
                            ),
                        });
                    };
                    bind(keyed_domains, &alias, remote.host, path, line_no)?;
                    push_line(&mut out, &remote.with_alias(&alias));
                    rewritten += 1;
                }
            }
        }

        if let State::KeyPending { alias, line } = state {
            return Err(PluginError::Parse {
                path: path.to_path_buf(),
                line,
                message: format!("key reference '{alias}' is not followed by a remote base url"),
            });
        }

        Ok((rewritten, out))
    }

    fn annotation_alias<'l>(
        &self,
        line: &'l str,
        path: &Path,
        line_no: usize,
    ) -> Result<Option<&'l str>> {
        let Some(alias) = self
            .annotation
            .captures(line)
            .and_then(|caps| caps.name("alias"))
            .map(|m| m.as_str())
        else {
            return Ok(None);
        };

        // alias ends up in ssh_config Host patterns and key file names
        if !alias.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
            return Err(PluginError::Parse {
                path: path.to_path_buf(),
                line: line_no,
                message: format!(
                    "invalid key reference '{alias}', only ASCII letters, digits and '_' are allowed"
                ),
            });
        }
        Ok(Some(alias))
    }
}

/// Record `alias -> host`, refusing to rebind an alias to another host
fn bind(
    keyed_domains: &mut BTreeMap<String, String>,
    alias: &str,
    host: &str,
    path: &Path,
    line: usize,
) -> Result<()> {
    match keyed_domains.get(alias) {
        Some(bound) if bound != host => Err(PluginError::Parse {
            path: path.to_path_buf(),
            line,
            message: format!(
                "key reference '{alias}' is used for host {host} but is already bound to host {bound}"
            ),
        }),
        Some(_) => Ok(()),
        None => {
            keyed_domains.insert(alias.to_string(), host.to_string());
            Ok(())
        }
    }
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push('\n');
}

/// Keyed host alias used in place of the real host, dots are not valid in an
/// ssh_config `Host` pattern that must match exactly
pub fn keyed_host(alias: &str, host: &str) -> String {
    format!("{alias}_{}", host.replace('.', "_"))
}

/// True when `line` is a remote base list item in one of the SSH URL forms
pub fn is_ssh_remote_line(line: &str) -> bool {
    RemoteLine::parse(line).is_some()
}

/// A remote base list item split around its host
#[derive(Debug, PartialEq, Eq)]
struct RemoteLine<'a> {
    head: &'a str,
    host: &'a str,
    tail: &'a str,
}

impl<'a> RemoteLine<'a> {
    fn parse(line: &'a str) -> Option<Self> {
        let item = line.trim_start().strip_prefix('-')?;
        let url = item.trim_start();
        if url.len() == item.len() || url.is_empty() {
            return None;
        }
        let url_start = line.len() - url.len();

        let (authority_start, has_scheme) = match url.strip_prefix("ssh://") {
            Some(_) => (url_start + "ssh://".len(), true),
            None => (url_start, false),
        };
        let user_len = user_prefix_len(&line[authority_start..]);
        if !has_scheme && user_len == 0 {
            return None;
        }

        let host_start = authority_start + user_len;
        let host_end = host_start + host_len(&line[host_start..]);
        if host_end == host_start {
            return None;
        }

        let tail = &line[host_end..];
        let valid = if has_scheme {
            ssh_tail_is_valid(tail, user_len > 0)
        } else {
            scp_tail_is_valid(tail)
        };

        valid.then_some(Self {
            head: &line[..host_start],
            host: &line[host_start..host_end],
            tail,
        })
    }

    fn with_alias(&self, alias: &str) -> String {
        format!("{}{}{}", self.head, keyed_host(alias, self.host), self.tail)
    }
}

/// Length of a `user@` prefix including the `@`, or 0 when there is none
fn user_prefix_len(s: &str) -> usize {
    let user_len = s
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
        .count();
    if user_len > 0 && s.as_bytes().get(user_len) == Some(&b'@') {
        user_len + 1
    } else {
        0
    }
}

fn host_len(s: &str) -> usize {
    match s.bytes().next() {
        Some(first) if first.is_ascii_alphanumeric() => s
            .bytes()
            .take_while(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-'))
            .count(),
        _ => 0,
    }
}

/// After `ssh://[user@]host`: `/path`, `:port/path`, or `:path` when a user is given
fn ssh_tail_is_valid(tail: &str, has_user: bool) -> bool {
    if tail.starts_with('/') {
        return true;
    }
    let Some(rest) = tail.strip_prefix(':') else {
        return false;
    };
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits > 0 && rest[digits..].starts_with('/') {
        return true;
    }
    has_user && starts_with_path_char(rest)
}

/// After `user@host`: `:path`
fn scp_tail_is_valid(tail: &str) -> bool {
    tail.strip_prefix(':').is_some_and(starts_with_path_char)
}

fn starts_with_path_char(s: &str) -> bool {
    s.chars().next().is_some_and(|c| !c.is_whitespace())
}
