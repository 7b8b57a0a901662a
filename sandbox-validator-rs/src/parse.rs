// sandbox-validator-rs/src/parse.rs
// Best-effort parsing of test runner and coverage tool output
//
// Runners print human-readable summaries in many shapes. Each parser
// recognises one shape; the first one that matches decides the counts.
// Output nobody recognises yields zeros; the raw text is kept elsewhere.

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TestCounts {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
}

impl TestCounts {
    fn from_parts(passed: u32, failed: u32, skipped: u32) -> Self {
        Self {
            total: passed + failed + skipped,
            passed,
            failed,
            skipped,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// Patterns are constant; a bad one is logged and its parser reports nothing.
fn re(pattern: &str) -> Option<Regex> {
    Regex::new(pattern)
        .map_err(|err| log::error!("invalid output pattern {:?}: {}", pattern, err))
        .ok()
}

static CARGO_RESULT: Lazy<Option<Regex>> =
    Lazy::new(|| re(r"test result: \w+\. (\d+) passed; (\d+) failed; (\d+) ignored"));
static JEST_TESTS_LINE: Lazy<Option<Regex>> = Lazy::new(|| re(r"(?m)^\s*Tests:\s+(.+)$"));
static PYTEST_SUMMARY: Lazy<Option<Regex>> =
    Lazy::new(|| re(r"(?m)^=+ (.*\b(?:passed|failed|error|errors|skipped)\b.*) in [\d.]+s.*=+\s*$"));
static MAVEN_RUN: Lazy<Option<Regex>> =
    Lazy::new(|| re(r"Tests run: (\d+), Failures: (\d+), Errors: (\d+), Skipped: (\d+)"));
static MOCHA_PASSING: Lazy<Option<Regex>> = Lazy::new(|| re(r"(?m)^\s*(\d+) passing\b"));
static MOCHA_FAILING: Lazy<Option<Regex>> = Lazy::new(|| re(r"(?m)^\s*(\d+) failing\b"));
static MOCHA_PENDING: Lazy<Option<Regex>> = Lazy::new(|| re(r"(?m)^\s*(\d+) pending\b"));
static GO_CASE: Lazy<Option<Regex>> = Lazy::new(|| re(r"(?m)^\s*--- (PASS|FAIL|SKIP): "));
static GO_PACKAGE: Lazy<Option<Regex>> = Lazy::new(|| re(r"(?m)^(ok|FAIL)\s+\S+"));
static COUNT_WORD: Lazy<Option<Regex>> = Lazy::new(|| re(r"(\d+) ([a-z]+)"));

fn num(s: &str) -> u32 {
    s.parse().unwrap_or(0)
}

fn cargo(text: &str) -> Option<TestCounts> {
    let mut found = false;
    let (mut passed, mut failed, mut skipped) = (0, 0, 0);
    // One line per test binary; sum them.
    for caps in CARGO_RESULT.as_ref()?.captures_iter(text) {
        found = true;
        passed += num(&caps[1]);
        failed += num(&caps[2]);
        skipped += num(&caps[3]);
    }
    found.then(|| TestCounts::from_parts(passed, failed, skipped))
}

/// `Tests:       1 failed, 2 skipped, 5 passed, 8 total`
fn jest(text: &str) -> Option<TestCounts> {
    let line = JEST_TESTS_LINE.as_ref()?.captures_iter(text).last()?;
    let (mut passed, mut failed, mut skipped, mut total) = (0, 0, 0, None);
    for caps in COUNT_WORD.as_ref()?.captures_iter(&line[1]) {
        let n = num(&caps[1]);
        match &caps[2] {
            "passed" => passed = n,
            "failed" => failed = n,
            "skipped" | "todo" => skipped += n,
            "total" => total = Some(n),
            _ => {}
        }
    }
    let mut counts = TestCounts::from_parts(passed, failed, skipped);
    if let Some(total) = total {
        counts.total = total;
    }
    (!counts.is_empty()).then_some(counts)
}

/// `==== 2 failed, 10 passed, 1 skipped in 0.52s ====`
fn pytest(text: &str) -> Option<TestCounts> {
    let line = PYTEST_SUMMARY.as_ref()?.captures_iter(text).last()?;
    let (mut passed, mut failed, mut skipped) = (0, 0, 0);
    for caps in COUNT_WORD.as_ref()?.captures_iter(&line[1]) {
        let n = num(&caps[1]);
        match &caps[2] {
            "passed" | "xpassed" => passed += n,
            "failed" | "error" | "errors" => failed += n,
            "skipped" | "xfailed" => skipped += n,
            _ => {}
        }
    }
    Some(TestCounts::from_parts(passed, failed, skipped))
}

/// Maven and Gradle print per-class lines then a summary; the last line is
/// the summary.
fn maven(text: &str) -> Option<TestCounts> {
    let caps = MAVEN_RUN.as_ref()?.captures_iter(text).last()?;
    let run = num(&caps[1]);
    let failed = num(&caps[2]) + num(&caps[3]);
    let skipped = num(&caps[4]);
    Some(TestCounts {
        total: run,
        passed: run.saturating_sub(failed + skipped),
        failed,
        skipped,
    })
}

fn mocha(text: &str) -> Option<TestCounts> {
    let count = |re: &Lazy<Option<Regex>>| {
        re.as_ref()
            .and_then(|re| re.captures(text))
            .map(|c| num(&c[1]))
    };
    let passed = count(&MOCHA_PASSING);
    let failed = count(&MOCHA_FAILING);
    let pending = count(&MOCHA_PENDING);
    if passed.is_none() && failed.is_none() {
        return None;
    }
    Some(TestCounts::from_parts(
        passed.unwrap_or(0),
        failed.unwrap_or(0),
        pending.unwrap_or(0),
    ))
}

/// Counts `--- PASS/FAIL/SKIP` test lines from `go test -v`; without `-v`,
/// falls back to counting packages.
fn go(text: &str) -> Option<TestCounts> {
    let (mut passed, mut failed, mut skipped) = (0, 0, 0);
    for caps in GO_CASE.as_ref()?.captures_iter(text) {
        match &caps[1] {
            "PASS" => passed += 1,
            "FAIL" => failed += 1,
            _ => skipped += 1,
        }
    }
    if passed + failed + skipped == 0 {
        for caps in GO_PACKAGE.as_ref()?.captures_iter(text) {
            match &caps[1] {
                "ok" => passed += 1,
                _ => failed += 1,
            }
        }
    }
    let counts = TestCounts::from_parts(passed, failed, skipped);
    (!counts.is_empty()).then_some(counts)
}

/// Structured counts from test runner output; zeros when unrecognised.
pub fn parse_test_output(text: &str) -> TestCounts {
    let parsers: [fn(&str) -> Option<TestCounts>; 6] = [cargo, jest, pytest, maven, mocha, go];
    parsers
        .iter()
        .find_map(|parse| parse(text))
        .unwrap_or_default()
}

struct CoverageFormat {
    pattern: Regex,
    /// Average every match instead of taking the first (per-package output)
    average: bool,
}

static COVERAGE_FORMATS: Lazy<Vec<CoverageFormat>> = Lazy::new(|| {
    [
        // go test -cover
        (r"coverage: (\d+(?:\.\d+)?)% of statements", true),
        // coverage.py
        (r"(?m)^TOTAL\b.*?(\d+(?:\.\d+)?)%", false),
        // istanbul text reporter, statements column
        (r"(?m)^\s*All files\s*\|\s*(\d+(?:\.\d+)?)", false),
        // lcov --summary
        (r"lines\.*:\s*(\d+(?:\.\d+)?)%", false),
        // cargo tarpaulin
        (r"(\d+(?:\.\d+)?)% coverage", false),
        // jacoco and other "Total ... N%" summaries
        (r"(?im)^.*\btotal\b.*?(\d+(?:\.\d+)?)%", false),
    ]
    .into_iter()
    .filter_map(|(pattern, average)| re(pattern).map(|pattern| CoverageFormat { pattern, average }))
    .collect()
});

/// Coverage percentage in `[0, 100]` from coverage tool output; `0.0` when
/// no known format is present.
pub fn parse_coverage(text: &str) -> f64 {
    for format in COVERAGE_FORMATS.iter() {
        let values: Vec<f64> = format
            .pattern
            .captures_iter(text)
            .filter_map(|caps| caps[1].parse::<f64>().ok())
            .collect();
        if values.is_empty() {
            continue;
        }
        let value = if format.average {
            values.iter().sum::<f64>() / values.len() as f64
        } else {
            values[0]
        };
        return clamp_percent(value);
    }
    0.0
}

/// Line coverage from a JaCoCo CSV report, summed over every class row.
/// `None` when the header has no line columns or the report counts no lines.
pub fn parse_jacoco_csv(text: &str) -> Option<f64> {
    let mut rows = text.lines().filter(|line| !line.trim().is_empty());
    let header: Vec<&str> = rows.next()?.split(',').map(str::trim).collect();
    let missed_at = header.iter().position(|column| *column == "LINE_MISSED")?;
    let covered_at = header.iter().position(|column| *column == "LINE_COVERED")?;

    let (mut missed, mut covered) = (0u64, 0u64);
    for row in rows {
        let cells: Vec<&str> = row.split(',').collect();
        let count = |at: usize| cells.get(at).and_then(|c| c.trim().parse::<u64>().ok()).unwrap_or(0);
        missed += count(missed_at);
        covered += count(covered_at);
    }

    let total = missed + covered;
    (total > 0).then(|| clamp_percent(covered as f64 * 100.0 / total as f64))
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn go_statement_coverage() {
        assert_eq!(parse_coverage("ok  \texample.com/pkg\t0.01s\tcoverage: 87.5% of statements"), 87.5);
    }

    #[test]
    fn coverage_py_total() {
        assert_eq!(parse_coverage("TOTAL 92%"), 92.0);
        let report = "Name      Stmts   Miss  Cover\n---\napp.py       40      4    90%\nTOTAL       120     10    92%\n";
        assert_eq!(parse_coverage(report), 92.0);
    }

    #[test]
    fn jacoco_csv_sums_line_counters() {
        let csv = "GROUP,PACKAGE,CLASS,INSTRUCTION_MISSED,INSTRUCTION_COVERED,BRANCH_MISSED,BRANCH_COVERED,LINE_MISSED,LINE_COVERED,COMPLEXITY_MISSED,COMPLEXITY_COVERED,METHOD_MISSED,METHOD_COVERED\n\
                   app,com.acme,Config,12,140,2,10,5,45,2,9,1,7\n\
                   app,com.acme,Main,30,90,4,4,5,25,3,5,1,4\n";
        assert_eq!(parse_jacoco_csv(csv), Some(87.5));
    }

    #[test]
    fn jacoco_csv_without_lines_is_none() {
        assert_eq!(parse_jacoco_csv(""), None);
        assert_eq!(parse_jacoco_csv("GROUP,PACKAGE,CLASS\napp,com.acme,Main\n"), None);
        assert_eq!(parse_jacoco_csv("GROUP,PACKAGE,CLASS,LINE_MISSED,LINE_COVERED\n"), None);
    }

    #[test]
    fn unparsable_coverage_is_zero() {
        assert_eq!(parse_coverage("no coverage here"), 0.0);
        assert_eq!(parse_coverage(""), 0.0);
    }

    #[test]
    fn go_packages_are_averaged() {
        let text = "coverage: 80.0% of statements\ncoverage: 60.0% of statements\n";
        assert_eq!(parse_coverage(text), 70.0);
    }

    #[test]
    fn cargo_results_are_summed() {
        let text = "test result: ok. 3 passed; 0 failed; 1 ignored; 0 measured\n\
                    test result: FAILED. 2 passed; 1 failed; 0 ignored; 0 measured\n";
        assert_eq!(
            parse_test_output(text),
            TestCounts { total: 7, passed: 5, failed: 1, skipped: 1 }
        );
    }

    #[test]
    fn unrecognised_output_is_zero() {
        assert_eq!(parse_test_output("Segmentation fault"), TestCounts::default());
    }
}
