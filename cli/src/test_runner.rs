use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use flang_engine::{EngineError, FileId, FsLoader, Session, SessionOptions, Spec};

use crate::spec_file;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestConfig {
    /// Human-readable test description.
    #[serde(default)]
    pub description: Option<String>,

    /// Texts matched before anything else, seeding the sample store.
    #[serde(default)]
    pub samples: Vec<String>,

    /// Text to match against the grammar.
    #[serde(default)]
    pub input: Option<String>,

    /// Expected spec produced by matching `input`.
    #[serde(default)]
    pub expect_spec: Option<toml::Table>,

    /// Partial spec completed from the samples.
    #[serde(default)]
    pub complete: Option<toml::Table>,

    /// Expected result of completing `complete`.
    #[serde(default)]
    pub expect_completed: Option<toml::Table>,

    /// Spec to generate from. Without it, a completed spec is generated.
    #[serde(default)]
    pub generate: Option<toml::Table>,

    /// Expected generated text (exact comparison).
    #[serde(default)]
    pub expect_output: Option<String>,

    /// Expected error: the error's Display string must contain this substring.
    #[serde(default)]
    pub expect_error: Option<String>,

    /// Expected load failure, matched the same way as `expect_error`.
    #[serde(default)]
    pub expect_load_error: Option<String>,

    #[serde(default)]
    pub options: SessionOptions,
}

const TEST_SUFFIX: &str = ".test.flang";
const DELIMITER: &str = "---";

/// Split a `.test.flang` file into its TOML config and grammar source.
fn parse_test_file(content: &str) -> Result<(TestConfig, &str), String> {
    let content = content.trim_start_matches('\u{feff}');
    let body = content
        .strip_prefix(DELIMITER)
        .ok_or("missing opening --- frontmatter delimiter")?;
    let body = strip_line_break(body);

    let close = body
        .find("\n---")
        .ok_or("missing closing --- frontmatter delimiter")?;
    let frontmatter = body[..close].trim_end_matches('\r');
    let source = strip_line_break(&body[close + 1 + DELIMITER.len()..]);

    let config: TestConfig =
        toml::from_str(frontmatter).map_err(|e| format!("TOML parse error: {}", e))?;
    Ok((config, source))
}

fn strip_line_break(text: &str) -> &str {
    text.strip_prefix("\r\n")
        .or_else(|| text.strip_prefix('\n'))
        .unwrap_or(text)
}

pub enum TestOutcome {
    Pass,
    Fail(String),
}

pub struct TestResult {
    pub path: PathBuf,
    pub description: Option<String>,
    pub outcome: TestOutcome,
}

fn run_single_test(path: &Path) -> TestResult {
    let loaded = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read file: {}", e))
        .and_then(|content| {
            parse_test_file(&content)
                .map(|(config, source)| (config, source.to_string()))
                .map_err(|e| format!("frontmatter error: {}", e))
        });

    let (config, source) = match loaded {
        Ok(pair) => pair,
        Err(reason) => {
            return TestResult {
                path: path.to_path_buf(),
                description: None,
                outcome: TestOutcome::Fail(reason),
            };
        }
    };

    debug!(test = %path.display(), options = ?config.options, "running test");
    let outcome = match evaluate(path, &config, &source) {
        None => TestOutcome::Pass,
        Some(reason) => TestOutcome::Fail(reason),
    };
    TestResult {
        path: path.to_path_buf(),
        description: config.description,
        outcome,
    }
}

/// Run one test. Returns `Some(reason)` on failure.
fn evaluate(path: &Path, config: &TestConfig, source: &str) -> Option<String> {
    // Dependencies of the grammar resolve next to the test file.
    let base_dir = path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "test".to_string());

    let mut session = Session::with_loader(FsLoader::new(base_dir), config.options);
    let load_result = session.load_source(&name, source);

    if let Some(expected) = &config.expect_load_error {
        return match load_result {
            Err(error) => expect_contains(expected, &error),
            Ok(_) => Some(format!(
                "expected load error containing \"{}\", but the grammar loaded",
                expected
            )),
        };
    }

    let grammar = match load_result {
        Ok(grammar) => grammar,
        Err(error) => return Some(format!("unexpected load error: {}", error)),
    };

    match (&config.expect_error, run_steps(config, &mut session, grammar)) {
        (Some(expected), Err(error)) => expect_contains(expected, &error),
        (Some(expected), Ok(None)) => Some(format!(
            "expected error containing \"{}\", but every step succeeded",
            expected
        )),
        (_, Ok(Some(reason))) => Some(reason),
        (None, Err(error)) => Some(format!("unexpected error: {}", error)),
        (None, Ok(None)) => None,
    }
}

fn expect_contains(expected: &str, error: &EngineError) -> Option<String> {
    let message = error.to_string();
    if message.contains(expected) {
        None
    } else {
        Some(format!(
            "expected error containing \"{}\", got: {}",
            expected, message
        ))
    }
}

/// Samples, then match, then completion, then generation. `Ok(Some(reason))`
/// reports an expectation mismatch.
fn run_steps(
    config: &TestConfig,
    session: &mut Session,
    grammar: FileId,
) -> Result<Option<String>, EngineError> {
    for (idx, sample) in config.samples.iter().enumerate() {
        if session.match_text(grammar, sample)?.is_none() {
            return Ok(Some(format!("sample[{}] did not match: {:?}", idx, sample)));
        }
    }

    if let Some(input) = &config.input {
        let Some(found) = session.match_text(grammar, input)? else {
            return Ok(Some(format!("input did not match: {:?}", input)));
        };
        if let Some(expected) = &config.expect_spec {
            if let Some(reason) = compare_spec("spec", expected, &found) {
                return Ok(Some(reason));
            }
        }
    }

    let mut completed: Option<Spec> = None;
    if let Some(partial) = &config.complete {
        let partial = match spec_file::from_table(partial) {
            Ok(spec) => spec,
            Err(e) => return Ok(Some(format!("complete: {}", e))),
        };
        let spec = session.complete(&partial)?;
        if let Some(expected) = &config.expect_completed {
            if let Some(reason) = compare_spec("completed spec", expected, &spec) {
                return Ok(Some(reason));
            }
        }
        completed = Some(spec);
    }

    let to_generate = match (&config.generate, completed) {
        (Some(table), _) => match spec_file::from_table(table) {
            Ok(spec) => Some(spec),
            Err(e) => return Ok(Some(format!("generate: {}", e))),
        },
        (None, completed) => completed,
    };

    if let Some(spec) = to_generate {
        let text = session.generate(grammar, &spec)?;
        if let Some(expected) = &config.expect_output {
            if &text != expected {
                return Ok(Some(format!(
                    "output mismatch\n  expected: {:?}\n  actual:   {:?}",
                    expected, text
                )));
            }
        }
    } else if config.expect_output.is_some() {
        return Ok(Some("expect_output needs `generate` or `complete`".to_string()));
    }

    Ok(None)
}

fn compare_spec(what: &str, expected: &toml::Table, actual: &Spec) -> Option<String> {
    let expected = match spec_file::from_table(expected) {
        Ok(spec) => spec,
        Err(e) => return Some(format!("expected {}: {}", what, e)),
    };
    if &expected == actual {
        None
    } else {
        Some(format!(
            "{} mismatch\n  expected:\n{}\n  actual:\n{}",
            what,
            indent(&spec_file::to_toml(&expected)),
            indent(&spec_file::to_toml(actual))
        ))
    }
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("    {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Test files grouped by category: the directory relative to `root`, with
/// `""` for files directly in it. Both levels are sorted.
fn discover(root: &Path) -> BTreeMap<String, Vec<PathBuf>> {
    let mut categories: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    walk(root, root, &mut categories);
    categories.values_mut().for_each(|files| files.sort());
    categories
}

fn walk(dir: &Path, root: &Path, out: &mut BTreeMap<String, Vec<PathBuf>>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for path in entries.flatten().map(|entry| entry.path()) {
        if path.is_dir() {
            walk(&path, root, out);
            continue;
        }
        let is_test = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(TEST_SUFFIX));
        if is_test {
            let category = dir
                .strip_prefix(root)
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();
            out.entry(category).or_default().push(path);
        }
    }
}

fn category_label(category: &str) -> &str {
    if category.is_empty() { "(root)" } else { category }
}

/// List available categories for the given test path.
pub fn list_categories(path: &Path) {
    if path.is_file() {
        eprintln!("(single file, no categories)");
        return;
    }
    let categories = discover(path);
    if categories.is_empty() {
        eprintln!("no {} files found in {}", TEST_SUFFIX, path.display());
        return;
    }
    eprintln!("available categories:");
    for (category, files) in &categories {
        eprintln!("  {} ({} tests)", category_label(category), files.len());
    }
}

/// Terminal styling for the report.
struct Style {
    color: bool,
}

impl Style {
    fn paint(&self, text: &str, code: &str) -> String {
        if self.color {
            format!("\x1b[{}m{}\x1b[0m", code, text)
        } else {
            text.to_string()
        }
    }

    fn pass(&self) -> String {
        self.paint("PASS", "32")
    }

    fn fail(&self) -> String {
        self.paint("FAIL", "31")
    }

    fn header(&self, text: &str) -> String {
        self.paint(text, "1")
    }
}

/// Select the categories to run: all of them, or each requested one together
/// with its subcategories.
fn select<'a>(
    all: &'a BTreeMap<String, Vec<PathBuf>>,
    requested: &[String],
) -> BTreeMap<&'a str, &'a [PathBuf]> {
    if requested.is_empty() {
        return all.iter().map(|(k, v)| (k.as_str(), v.as_slice())).collect();
    }

    let mut selected = BTreeMap::new();
    for request in requested {
        let request = request.trim_matches('/');
        let nested = format!("{}/", request);
        let before = selected.len();
        for (category, files) in all {
            if category == request || category.starts_with(&nested) {
                selected.insert(category.as_str(), files.as_slice());
            }
        }
        if selected.len() == before {
            let available: Vec<&str> = all.keys().map(|k| category_label(k)).collect();
            eprintln!(
                "warning: category '{}' not found (available: {})",
                request,
                available.join(", ")
            );
        }
    }
    selected
}

/// Run all `.test.flang` files under `path` (or a single file), optionally
/// restricted to `categories`. Returns the process exit code.
pub fn run_tests(path: &Path, no_color: bool, categories: &[String]) -> i32 {
    let style = Style { color: !no_color };

    let all = if path.is_file() {
        BTreeMap::from([(String::new(), vec![path.to_path_buf()])])
    } else {
        discover(path)
    };
    if all.is_empty() {
        eprintln!("no {} files found in {}", TEST_SUFFIX, path.display());
        return 1;
    }

    let selected = if path.is_file() {
        select(&all, &[])
    } else {
        select(&all, categories)
    };
    if selected.is_empty() {
        eprintln!("no matching categories found");
        return 1;
    }

    let mut passed = 0usize;
    let mut failures: Vec<TestResult> = Vec::new();

    for (category, files) in &selected {
        if !path.is_file() {
            eprintln!();
            eprintln!("{}", style.header(category_label(category)));
        }
        for file in *files {
            let result = run_single_test(file);
            let label = result.description.clone().unwrap_or_else(|| {
                file.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.trim_end_matches(TEST_SUFFIX).to_string())
                    .unwrap_or_else(|| "?".to_string())
            });
            match result.outcome {
                TestOutcome::Pass => {
                    passed += 1;
                    eprintln!("  {}  {}", style.pass(), label);
                }
                TestOutcome::Fail(_) => {
                    eprintln!("  {}  {}", style.fail(), label);
                    failures.push(result);
                }
            }
        }
    }

    if !failures.is_empty() {
        eprintln!();
        eprintln!("failures:");
        for failure in &failures {
            eprintln!();
            eprintln!("  --- {} ---", failure.path.display());
            if let TestOutcome::Fail(reason) = &failure.outcome {
                reason.lines().for_each(|line| eprintln!("  {}", line));
            }
        }
    }

    eprintln!();
    let failed = failures.len();
    if failed == 0 {
        eprintln!("test result: {}. {} passed, 0 failed", style.paint("ok", "32"), passed);
        0
    } else {
        eprintln!(
            "test result: {}. {} passed, {} failed (of {})",
            style.paint("FAILED", "31"),
            passed,
            failed,
            passed + failed
        );
        1
    }
}
