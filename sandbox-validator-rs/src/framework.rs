// sandbox-validator-rs/src/framework.rs
// Framework detection from marker files

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameworkKind {
    Go,
    Rust,
    Node,
    Python,
    Maven,
    Gradle,
    Generic,
}

impl FrameworkKind {
    pub fn name(&self) -> &'static str {
        match self {
            FrameworkKind::Go => "go",
            FrameworkKind::Rust => "rust",
            FrameworkKind::Node => "node",
            FrameworkKind::Python => "python",
            FrameworkKind::Maven => "maven",
            FrameworkKind::Gradle => "gradle",
            FrameworkKind::Generic => "generic",
        }
    }
}

impl fmt::Display for FrameworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The commands that validate one kind of project. Every stage is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Framework {
    pub kind: FrameworkKind,
    pub build_cmd: Option<String>,
    pub lint_cmd: Option<String>,
    pub test_cmd: Option<String>,
    pub coverage_cmd: Option<String>,
    /// Report written by `coverage_cmd` when the tool prints no summary
    /// (JaCoCo CSV, relative to the workspace root)
    pub coverage_report: Option<String>,
    pub env: BTreeMap<String, String>,
}

/// Marker files in priority order. The first one present wins.
pub const MARKER_FILES: &[(&str, FrameworkKind)] = &[
    ("go.mod", FrameworkKind::Go),
    ("Cargo.toml", FrameworkKind::Rust),
    ("package.json", FrameworkKind::Node),
    ("pyproject.toml", FrameworkKind::Python),
    ("requirements.txt", FrameworkKind::Python),
    ("setup.py", FrameworkKind::Python),
    ("pom.xml", FrameworkKind::Maven),
    ("build.gradle", FrameworkKind::Gradle),
    ("build.gradle.kts", FrameworkKind::Gradle),
];

/// Checked only when no marker matches.
pub const GENERIC_MARKER: &str = "Makefile";

fn cmd(s: &str) -> Option<String> {
    Some(s.to_string())
}

fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

impl Framework {
    pub fn for_kind(kind: FrameworkKind) -> Self {
        match kind {
            FrameworkKind::Go => Framework {
                kind,
                build_cmd: cmd("go build ./..."),
                lint_cmd: cmd("go vet ./..."),
                test_cmd: cmd("go test -v ./..."),
                coverage_cmd: cmd("go test -cover ./..."),
                coverage_report: None,
                env: env(&[("GOFLAGS", "-mod=mod"), ("CGO_ENABLED", "0")]),
            },
            FrameworkKind::Rust => Framework {
                kind,
                build_cmd: cmd("cargo build --all-targets"),
                lint_cmd: cmd("cargo clippy --all-targets"),
                test_cmd: cmd("cargo test"),
                coverage_cmd: cmd("cargo tarpaulin --skip-clean"),
                coverage_report: None,
                env: env(&[("CARGO_TERM_COLOR", "never")]),
            },
            FrameworkKind::Node => Framework {
                kind,
                build_cmd: cmd("npm ci && npm run build --if-present"),
                lint_cmd: cmd("npm run lint --if-present"),
                test_cmd: cmd("npm test"),
                coverage_cmd: cmd("npm test -- --coverage"),
                coverage_report: None,
                env: env(&[("CI", "true")]),
            },
            FrameworkKind::Python => Framework {
                kind,
                build_cmd: cmd("python -m compileall -q ."),
                lint_cmd: cmd("python -m flake8 ."),
                test_cmd: cmd("python -m pytest"),
                coverage_cmd: cmd("python -m pytest --cov=. --cov-report=term"),
                coverage_report: None,
                env: env(&[("PYTHONDONTWRITEBYTECODE", "1")]),
            },
            FrameworkKind::Maven => Framework {
                kind,
                build_cmd: cmd("mvn -B -q compile"),
                lint_cmd: None,
                test_cmd: cmd("mvn -B test"),
                coverage_cmd: cmd("mvn -B verify jacoco:report"),
                coverage_report: Some("target/site/jacoco/jacoco.csv".to_string()),
                env: BTreeMap::new(),
            },
            FrameworkKind::Gradle => Framework {
                kind,
                build_cmd: cmd("./gradlew assemble"),
                lint_cmd: None,
                test_cmd: cmd("./gradlew test"),
                coverage_cmd: cmd("./gradlew jacocoTestReport"),
                coverage_report: Some("build/reports/jacoco/test/jacocoTestReport.csv".to_string()),
                env: BTreeMap::new(),
            },
            FrameworkKind::Generic => Framework {
                kind,
                build_cmd: None,
                lint_cmd: None,
                test_cmd: None,
                coverage_cmd: None,
                coverage_report: None,
                env: BTreeMap::new(),
            },
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

/// The framework for a single marker file name, if it is one.
pub fn framework_for_marker(file_name: &str) -> Option<FrameworkKind> {
    MARKER_FILES
        .iter()
        .find(|(marker, _)| *marker == file_name)
        .map(|(_, kind)| *kind)
}

/// Pick the framework for a workspace whose root contains `present`.
///
/// Pure: callers list the marker files they found, in any order.
pub fn detect_framework<'a, I>(present: I) -> Framework
where
    I: IntoIterator<Item = &'a str>,
{
    let present: Vec<&str> = present.into_iter().collect();

    let detected = MARKER_FILES
        .iter()
        .find(|(marker, _)| present.contains(marker))
        .map(|(_, kind)| Framework::for_kind(*kind));

    detected.unwrap_or_else(|| {
        let mut generic = Framework::for_kind(FrameworkKind::Generic);
        if present.contains(&GENERIC_MARKER) {
            generic.test_cmd = cmd("make test");
        }
        generic
    })
}
