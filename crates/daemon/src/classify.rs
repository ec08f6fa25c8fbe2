//! Lexical mapping from a changed path to the reload targets it implies.

use std::collections::BTreeSet;
use std::path::Path;

use globset::{Glob, GlobBuilder, GlobMatcher};

use provsync_core::ReloadTarget;

fn matcher(pattern: &str) -> Result<GlobMatcher, globset::Error> {
    let glob: Glob = GlobBuilder::new(pattern).literal_separator(true).build()?;
    Ok(glob.compile_matcher())
}

/// Matches `**/dashboards/*` and `**/datasources/*` against path shape only.
///
/// `*` never crosses a separator, so only direct children of a `dashboards`
/// or `datasources` directory match. Dotfiles (swap files, atomic-write
/// temporaries) never match. The filesystem is not consulted.
#[derive(Debug, Clone)]
pub struct PathClassifier {
    matchers: Vec<(ReloadTarget, GlobMatcher)>,
}

impl PathClassifier {
    pub fn new() -> Result<Self, globset::Error> {
        let matchers = ReloadTarget::ALL
            .iter()
            .map(|&target| Ok((target, matcher(&format!("**/{}/*", target.as_str()))?)))
            .collect::<Result<Vec<_>, globset::Error>>()?;
        Ok(Self { matchers })
    }

    pub fn classify(&self, path: &Path) -> BTreeSet<ReloadTarget> {
        let hidden = path
            .file_name()
            .map(|n| n.as_encoded_bytes().first() == Some(&b'.'))
            .unwrap_or(true);
        if hidden {
            return BTreeSet::new();
        }

        self.matchers
            .iter()
            .filter(|(_, m)| m.is_match(path))
            .map(|(target, _)| *target)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(path: &str) -> Vec<ReloadTarget> {
        PathClassifier::new()
            .unwrap()
            .classify(Path::new(path))
            .into_iter()
            .collect()
    }

    #[test]
    fn dashboard_files() {
        for path in [
            "/etc/grafana/provisioning/dashboards/default.yaml",
            "/etc/grafana/provisioning/dashboards/node-exporter.json",
            "provisioning/dashboards/x",
            "dashboards/x.yml",
        ] {
            assert_eq!(classify(path), vec![ReloadTarget::Dashboards], "{path}");
        }
    }

    #[test]
    fn datasource_files() {
        for path in [
            "/etc/grafana/provisioning/datasources/prometheus.yaml",
            "/srv/a/b/c/datasources/loki.yml",
        ] {
            assert_eq!(classify(path), vec![ReloadTarget::Datasources], "{path}");
        }
    }

    #[test]
    fn unrelated_paths() {
        for path in [
            "/etc/grafana/provisioning/alerting/rules.yaml",
            "/etc/grafana/provisioning/dashboards",
            "/etc/grafana/provisioning/dashboards/team/board.json",
            "/etc/grafana/provisioning/plugins/app.yaml",
            "/etc/grafana/provisioning/dashboardsx/a.json",
            "/etc/grafana/provisioning",
        ] {
            assert!(classify(path).is_empty(), "{path}");
        }
    }

    #[test]
    fn nested_target_directories_match_innermost_only() {
        assert_eq!(
            classify("/p/dashboards/datasources/a.yaml"),
            vec![ReloadTarget::Datasources]
        );
    }

    #[test]
    fn dotfiles_are_ignored() {
        assert!(classify("/p/dashboards/.board.json.swp").is_empty());
        assert!(classify("/p/datasources/.serviceaccount.json.tmp").is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_names_are_still_classified() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let classifier = PathClassifier::new().unwrap();
        let name = OsStr::from_bytes(b"board-\xff.json");
        let path = Path::new("/p/dashboards").join(name);
        assert_eq!(
            classifier.classify(&path).into_iter().collect::<Vec<_>>(),
            vec![ReloadTarget::Dashboards]
        );

        let hidden = Path::new("/p/dashboards").join(OsStr::from_bytes(b".\xff.swp"));
        assert!(classifier.classify(&hidden).is_empty());
    }
}
