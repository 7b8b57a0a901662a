// failure-classifier-rs/src/rules.rs
// Ordered rule table. Earlier rules are more specific and win ties.

use once_cell::sync::Lazy;
use regex::Regex;
use shared_types::{FailureCategory, FailureType, Severity};

/// One entry of the classification table.
#[derive(Debug)]
pub struct Rule {
    pub name: &'static str,
    pub pattern: Regex,
    pub failure_type: FailureType,
    pub severity: Severity,
    pub category: FailureCategory,
    pub confidence: f64,
    pub tags: &'static [&'static str],
}

fn rule(
    name: &'static str,
    pattern: &str,
    failure_type: FailureType,
    severity: Severity,
    category: FailureCategory,
    confidence: f64,
    tags: &'static [&'static str],
) -> Option<Rule> {
    match Regex::new(pattern) {
        Ok(pattern) => Some(Rule {
            name,
            pattern,
            failure_type,
            severity,
            category,
            confidence,
            tags,
        }),
        Err(e) => {
            tracing::error!(rule = name, error = %e, "invalid classification rule; skipping");
            None
        }
    }
}

pub(crate) static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    use FailureCategory::*;
    use FailureType::*;
    use Severity::*;

    vec![
        rule(
            "security_advisory",
            r"(?i)(CVE-\d{4}-\d{4,}|RUSTSEC-\d{4}-\d{4}|GHSA-[a-z0-9]{4}-|\d+ (?:high|critical) severity vulnerabilit|secret (?:detected|leaked)|gosec|bandit:)",
            Security,
            Critical,
            Systematic,
            0.9,
            &["security", "audit"],
        ),
        rule(
            "dependency_resolution",
            r"(?i)(ERESOLVE|could not resolve dependenc|unable to resolve dependency tree|No matching distribution found|failed to select a version|version solving failed|missing go\.sum entry|Could not resolve all (?:files|dependencies)|Cannot find module '|ModuleNotFoundError: No module named|lock file .* (?:out of date|needs to be updated))",
            Dependency,
            High,
            Systematic,
            0.85,
            &["dependency"],
        ),
        rule(
            "runner_environment",
            r"(?i)(no space left on device|lost communication with the server|runner has received a shutdown signal|OOMKilled|out of memory|killed signal 9|exit code 137)",
            Infrastructure,
            High,
            Environmental,
            0.8,
            &["infrastructure", "runner"],
        ),
        rule(
            "network_transient",
            r"(?i)(connection (?:refused|reset by peer|timed out)|ECONNRESET|ETIMEDOUT|ENOTFOUND|temporary failure in name resolution|TLS handshake timeout|502 Bad Gateway|503 Service Unavailable|429 Too Many Requests|rate limit exceeded)",
            Infrastructure,
            Medium,
            Transient,
            0.8,
            &["infrastructure", "network"],
        ),
        rule(
            "pipeline_configuration",
            r"(?i)(invalid workflow file|yaml: line \d+|environment variable \S+ (?:is )?(?:not set|required)|missing required (?:secret|input|configuration)|Permission denied \(publickey\)|unknown (?:flag|option):)",
            Configuration,
            Medium,
            Systematic,
            0.75,
            &["configuration"],
        ),
        rule(
            "deployment",
            r"(?i)(deploy(?:ment)? failed|helm (?:install|upgrade) .*(?:failed|error)|rollout status .*(?:failed|exceeded)|Error: UPGRADE FAILED|terraform apply .*error|ImagePullBackOff|CrashLoopBackOff)",
            Deployment,
            High,
            Environmental,
            0.75,
            &["deployment"],
        ),
        rule(
            "compilation",
            r"(?m)(?i)(error\[E\d{4}\]|error: could not compile|compilation (?:failed|error)|cannot find symbol|undefined reference to|error TS\d{4}|BUILD FAILURE|make: \*\*\* .*Error|^\S+\.go:\d+:\d+: undefined:|SyntaxError:|fatal error: .*: No such file or directory)",
            Build,
            High,
            Systematic,
            0.85,
            &["build", "compile"],
        ),
        rule(
            "flaky_test",
            r"(?i)(WARNING: DATA RACE|race detected|flaky|intermittent(?:ly)? fail|timed out waiting for|context deadline exceeded|test timed out after)",
            Test,
            Medium,
            Flaky,
            0.7,
            &["test", "flaky"],
        ),
        rule(
            "test_failure",
            r"(?m)(?i)(^--- FAIL:|^FAIL\s|^FAILED \S+::|AssertionError|assertion (?:failed|`left == right` failed)|test result: FAILED|Tests run: \d+, Failures: [1-9]|\b[1-9]\d* (?:failed|failing)\b|panicked at)",
            Test,
            Medium,
            Systematic,
            0.8,
            &["test"],
        ),
        rule(
            "lint",
            r"(?i)(eslint|clippy|golangci-lint|flake8|pylint|ruff check|rustfmt|gofmt|prettier --check|black --check|would reformat)",
            Code,
            Low,
            Systematic,
            0.7,
            &["lint", "style"],
        ),
        rule(
            "runtime_error",
            r"(?i)(NullPointerException|TypeError:|nil pointer dereference|index out of range|segmentation fault|undefined is not a function|Traceback \(most recent call last\))",
            Code,
            High,
            Systematic,
            0.7,
            &["runtime"],
        ),
        rule(
            "job_timeout",
            r"(?i)(exceeded the maximum execution time|has exceeded the maximum execution time|job was cancelled|timeout of \d+ ?(?:min|minutes|s) exceeded)",
            Infrastructure,
            Medium,
            Transient,
            0.6,
            &["timeout"],
        ),
    ]
    .into_iter()
    .flatten()
    .collect()
});

/// Rule names in evaluation order.
pub fn rule_names() -> Vec<&'static str> {
    RULES.iter().map(|r| r.name).collect()
}
