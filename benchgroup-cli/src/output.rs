//! Output formatting for the CLI
//!
//! Everything printed around the live table: the banner, the suite listing
//! and the final status lines.

use benchgroup_runtime::{depth_first, BenchmarkConfig, Node, ReportError, SuiteRunner, TestState};
use colored::*;

pub fn print_banner(runner: &SuiteRunner, config: &BenchmarkConfig) {
    let (groups, tests) = count(runner.forest());
    println!(
        "{} {} groups, {} tests ({}, min {} samples, {}ms per test)",
        "BENCHGROUP".green().bold(),
        groups.to_string().cyan(),
        tests.to_string().cyan(),
        runner.id().to_string().dimmed(),
        config.measurement.min_samples,
        config.measurement.max_time_ms
    );
    println!();
}

fn count(forest: &[Node]) -> (usize, usize) {
    let mut groups = 0;
    let mut tests = 0;
    depth_first(forest, |visit| match visit.node {
        Node::Group(_) => groups += 1,
        Node::Test(_) => tests += 1,
    });
    (groups, tests)
}

/// Indented outline of the declared suite, one node per line
pub fn tree_lines(forest: &[Node]) -> Vec<String> {
    let mut lines = Vec::new();
    depth_first(forest, |visit| {
        let indent = "  ".repeat(visit.depth - 1);
        let line = match visit.node {
            Node::Group(group) => format!("{}{}", indent, group.title().bold()),
            Node::Test(test) if test.context().is_empty() => format!("{}- {}", indent, test.title()),
            Node::Test(test) => {
                let keys: Vec<_> = test.context().keys().map(String::as_str).collect();
                format!("{}- {} {}", indent, test.title(), format!("[{}]", keys.join(", ")).dimmed())
            }
        };
        lines.push(line);
    });
    lines
}

pub fn print_tree(forest: &[Node]) {
    for line in tree_lines(forest) {
        println!("{}", line);
    }
    let (groups, tests) = count(forest);
    println!("\n{} groups, {} tests", groups, tests);
}

pub fn print_success(runner: &SuiteRunner) {
    let mut samples = 0;
    depth_first(&runner.extract_results(), |visit| {
        if let Some(test) = visit.node.as_test() {
            if let TestState::Finished(figures) = test.state {
                samples += figures.sample_count;
            }
        }
    });

    println!();
    println!("{} {} samples collected", "DONE".green().bold(), samples);
}

pub fn print_nothing_to_run() {
    println!("{} no benchmarks declared", "SKIP".yellow().bold());
}

pub fn print_failure(err: &ReportError, shown: bool) {
    eprintln!("{} {}", "FAILED".red().bold(), failure_message(err, shown));
}

fn failure_message(err: &ReportError, shown: bool) -> String {
    if shown {
        "benchmark run aborted".to_string()
    } else {
        err.to_string()
    }
}
