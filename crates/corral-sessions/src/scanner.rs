// SPDX-License-Identifier: Apache-2.0
//! Project Scanner — enumerates projects by walking each supported agent
//! family's on-disk transcript root.
//! Deduplicates by canonical path; resolves the Claude family's lossy
//! directory-name hash via a reverse lookup over already-known paths,
//! falling back to scanning file contents for `cwd`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use corral_core::model::{Project, ProjectId};

use crate::transcript::{self, AgentFamily};

pub struct ProjectScanner;

impl ProjectScanner {
    /// Enumerate every project discoverable under the given family roots.
    /// `known_paths` seeds the reverse lookup for hashed directory names —
    /// callers typically pass previously-resolved projects plus any
    /// virtual (not-yet-discovered) project paths the supervisor already
    /// knows about.
    pub fn scan(roots: &[(AgentFamily, PathBuf)], known_paths: &[PathBuf]) -> Vec<Project> {
        let mut by_path: HashMap<PathBuf, Project> = HashMap::new();

        for (family, root) in roots {
            let Ok(read_dir) = std::fs::read_dir(root) else {
                continue; // missing transcript directory is empty, not an error
            };
            for entry in read_dir.filter_map(|e| e.ok()) {
                let dir_path = entry.path();
                if !dir_path.is_dir() {
                    continue;
                }
                let dir_name = dir_path.file_name().and_then(|n| n.to_str()).unwrap_or_default();

                let resolved_path = resolve_path(*family, dir_name, &dir_path, known_paths);
                let (canonical_path, project_id) = match resolved_path {
                    Some(path) => {
                        let id = ProjectId::from_path(&path);
                        (path, id)
                    }
                    None => {
                        // Unresolved hash placeholder.
                        let prefix: String = dir_name.chars().take(12).collect();
                        let placeholder_id = ProjectId(format!("{}:{}", family.as_str(), prefix));
                        (dir_path.clone(), placeholder_id)
                    }
                };

                let session_count = std::fs::read_dir(&dir_path)
                    .map(|rd| {
                        rd.filter_map(|e| e.ok())
                            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("jsonl"))
                            .filter(|e| {
                                e.path()
                                    .file_stem()
                                    .and_then(|s| s.to_str())
                                    .map(|s| !family.is_subsidiary_file(s))
                                    .unwrap_or(false)
                            })
                            .count()
                    })
                    .unwrap_or(0);

                let last_activity = latest_mtime(&dir_path);

                by_path
                    .entry(canonical_path.clone())
                    .and_modify(|p| {
                        p.session_count += session_count;
                        if last_activity > p.last_activity {
                            p.last_activity = last_activity;
                        }
                    })
                    .or_insert_with(|| Project {
                        id: project_id,
                        display_name: display_name(&canonical_path),
                        path: canonical_path,
                        session_count,
                        last_activity,
                        agent_family: Some(family.as_str().to_string()),
                        discovered: true,
                    });
            }
        }

        // Virtual projects: directories that exist on disk but have no
        // transcripts yet.
        for path in known_paths {
            if !by_path.contains_key(path) && path.is_dir() {
                by_path.insert(
                    path.clone(),
                    Project {
                        id: ProjectId::from_path(path),
                        path: path.clone(),
                        display_name: display_name(path),
                        session_count: 0,
                        last_activity: None,
                        agent_family: None,
                        discovered: false,
                    },
                );
            }
        }

        by_path.into_values().collect()
    }
}

fn resolve_path(
    family: AgentFamily,
    dir_name: &str,
    dir_path: &Path,
    known_paths: &[PathBuf],
) -> Option<PathBuf> {
    if !family.hashes_directory_names() {
        // Reversible encoding: the directory name literally is the
        // project's base64url-encoded path.
        return decode_base64url_path(dir_name);
    }

    // Claude-style lossy hash: first try every known path's own encoding...
    if let Some(path) = known_paths
        .iter()
        .find(|p| family.encode_dir_name(p) == dir_name)
    {
        return Some(path.clone());
    }

    // ...then fall back to scanning a transcript file's `cwd` field.
    std::fs::read_dir(dir_path)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("jsonl"))
        .find_map(|e| transcript::extract_cwd(&e.path()))
}

fn decode_base64url_path(encoded: &str) -> Option<PathBuf> {
    use base64::Engine;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(encoded).ok()?;
    String::from_utf8(bytes).ok().map(PathBuf::from)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

fn latest_mtime(dir: &Path) -> Option<chrono::DateTime<chrono::Utc>> {
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .filter_map(|e| e.metadata().ok()?.modified().ok())
        .max()
        .map(chrono::DateTime::<chrono::Utc>::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codex_style_directory_resolves_without_known_paths() {
        let dir = tempfile::tempdir().unwrap();
        let project_path = PathBuf::from("/home/dev/demo");
        let encoded = AgentFamily::Codex.encode_dir_name(&project_path);
        let project_dir = dir.path().join(&encoded);
        std::fs::create_dir(&project_dir).unwrap();
        std::fs::write(
            project_dir.join("s1.jsonl"),
            r#"{"type":"user","uuid":"m1","message":{"role":"user","content":"hi"}}"#,
        )
        .unwrap();

        let projects = ProjectScanner::scan(&[(AgentFamily::Codex, dir.path().to_path_buf())], &[]);
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].path, project_path);
        assert_eq!(projects[0].session_count, 1);
    }

    #[test]
    fn claude_style_hash_resolves_via_known_paths() {
        let dir = tempfile::tempdir().unwrap();
        let project_path = PathBuf::from("/home/dev/my-app");
        let encoded = AgentFamily::Claude.encode_dir_name(&project_path);
        std::fs::create_dir(dir.path().join(&encoded)).unwrap();

        let projects = ProjectScanner::scan(
            &[(AgentFamily::Claude, dir.path().to_path_buf())],
            &[project_path.clone()],
        );
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].path, project_path);
    }

    #[test]
    fn unresolvable_claude_hash_becomes_scheme_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("-unknown-path-never-seen")).unwrap();

        let projects = ProjectScanner::scan(&[(AgentFamily::Claude, dir.path().to_path_buf())], &[]);
        assert_eq!(projects.len(), 1);
        assert!(projects[0].id.0.starts_with("claude:"));
    }

    #[test]
    fn missing_transcript_root_is_treated_as_empty() {
        let projects = ProjectScanner::scan(
            &[(AgentFamily::Claude, PathBuf::from("/nonexistent/corral/root"))],
            &[],
        );
        assert!(projects.is_empty());
    }
}
