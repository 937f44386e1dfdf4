//! Application origin descriptors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where an application's runnable image comes from.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Origin {
    /// Created without a workload; nothing to stage yet.
    #[default]
    None,
    /// Git repository at an optional revision (branch, tag or commit).
    Git {
        repository: String,
        revision: Option<String>,
    },
    /// Uploaded source archive, addressed by its blob path.
    Path { path: String },
    /// Pre-built container image; never staged.
    Container { image: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OriginError {
    #[error("unsupported origin: {0}")]
    Unsupported(String),
    #[error("invalid origin: {0}")]
    Invalid(String),
}

impl Origin {
    /// Parse the compact string form used by CLIs and manifests.
    ///
    /// - `docker://nginx:1.25`, `oci://registry/app:v1` → container image
    /// - `git+https://host/repo.git#main`, `git://host/repo#v1`, `https://host/repo.git`
    /// - `file:///tmp/app.tar.gz`, `./app`, `/abs/app` → uploaded path
    pub fn parse(uri: &str) -> Result<Self, OriginError> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(OriginError::Invalid("empty origin".to_string()));
        }

        if let Some(image) = uri
            .strip_prefix("docker://")
            .or_else(|| uri.strip_prefix("oci://"))
        {
            if image.is_empty() {
                return Err(OriginError::Invalid(uri.to_string()));
            }
            return Ok(Origin::Container {
                image: image.to_string(),
            });
        }

        let git = uri
            .strip_prefix("git+")
            .or_else(|| uri.starts_with("git://").then_some(uri))
            .or_else(|| {
                (uri.starts_with("https://") && uri.trim_end_matches('/').ends_with(".git"))
                    .then_some(uri)
            });
        if let Some(git) = git {
            let (repository, revision) = match git.rsplit_once('#') {
                Some((repo, rev)) if !rev.is_empty() => (repo, Some(rev.to_string())),
                Some((repo, _)) => (repo, None),
                None => (git, None),
            };
            return Ok(Origin::Git {
                repository: repository.to_string(),
                revision,
            });
        }

        if let Some(path) = uri.strip_prefix("file://") {
            return Ok(Origin::Path {
                path: path.to_string(),
            });
        }
        if uri.starts_with("./") || uri.starts_with('/') {
            return Ok(Origin::Path {
                path: uri.to_string(),
            });
        }

        Err(OriginError::Unsupported(uri.to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Origin::None => "none",
            Origin::Git { .. } => "git",
            Origin::Path { .. } => "path",
            Origin::Container { .. } => "container",
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Origin::Container { .. })
    }

    /// Whether the staging pipeline can turn this origin into an image.
    pub fn is_stageable(&self) -> bool {
        matches!(self, Origin::Git { .. } | Origin::Path { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_container() {
        assert_eq!(
            Origin::parse("docker://splatform/sample-app").unwrap(),
            Origin::Container {
                image: "splatform/sample-app".to_string()
            }
        );
        assert!(Origin::parse("oci://ghcr.io/org/app:v1").unwrap().is_container());
    }

    #[test]
    fn parse_git_with_revision() {
        assert_eq!(
            Origin::parse("git+https://github.com/org/example-wordpress#main").unwrap(),
            Origin::Git {
                repository: "https://github.com/org/example-wordpress".to_string(),
                revision: Some("main".to_string()),
            }
        );
    }

    #[test]
    fn parse_git_without_revision() {
        let origin = Origin::parse("https://github.com/org/app.git").unwrap();
        assert_eq!(
            origin,
            Origin::Git {
                repository: "https://github.com/org/app.git".to_string(),
                revision: None,
            }
        );
        assert!(origin.is_stageable());
    }

    #[test]
    fn parse_paths() {
        assert_eq!(Origin::parse("./sample-app").unwrap().kind(), "path");
        assert_eq!(
            Origin::parse("file:///tmp/blob.tar").unwrap(),
            Origin::Path {
                path: "/tmp/blob.tar".to_string()
            }
        );
    }

    #[test]
    fn parse_rejects_unknown() {
        assert!(matches!(
            Origin::parse("ftp://x"),
            Err(OriginError::Unsupported(_))
        ));
        assert!(Origin::parse("docker://").is_err());
        assert!(Origin::parse("  ").is_err());
    }

    #[test]
    fn stageability() {
        assert!(!Origin::None.is_stageable());
        assert!(
            !Origin::Container {
                image: "nginx".to_string()
            }
            .is_stageable()
        );
    }

    #[test]
    fn serde_tagged() {
        let json = serde_json::to_string(&Origin::Container {
            image: "nginx".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"kind":"container","image":"nginx"}"#);
    }
}
