//! Tests for the `flowtag` binary.

use flowtag::FlowLogGenerator;
use flowtag::settings::{DATA_DIRECTORY, LOOKUP_TABLE_FILE, OUTPUT_FILE, data_path};
use flowtag::testing::{SAMPLE_LOOKUP_TABLE, TempDirPath, read_lines, write_lines};
use std::process::Command;

fn flowtag(dir: &TempDirPath) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_flowtag"));
    command.current_dir(dir.path());
    command
}

/// Sum of the last column over the rows that follow `header`, up to the next
/// blank line.
fn section_total(report: &[String], header: &str) -> anyhow::Result<u64> {
    let mut total = 0;
    for line in report
        .iter()
        .skip_while(|line| line.as_str() != header)
        .skip(1)
        .take_while(|line| !line.is_empty())
    {
        let count = line.rsplit(',').next().unwrap_or_default();
        total += count.parse::<u64>()?;
    }
    Ok(total)
}

#[test]
fn generated_input_is_counted_with_default_paths() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    std::fs::create_dir_all(dir.path().join(DATA_DIRECTORY))?;
    write_lines(&dir.path().join(data_path(LOOKUP_TABLE_FILE)), SAMPLE_LOOKUP_TABLE)?;

    let output = flowtag(&dir).args(["--generate", "1", "--sequential"]).output()?;
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "{stderr}");
    assert!(stderr.contains("Counted 10485 records"), "{stderr}");

    let expected = FlowLogGenerator::of_mebibytes(1).limit().unwrap_or_default();
    let report = read_lines(&dir.path().join(data_path(OUTPUT_FILE)))?;
    assert_eq!(report[0], "Tag Counts:");
    assert_eq!(section_total(&report, "Tag,Count")?, expected);
    assert_eq!(section_total(&report, "Port,Protocol,Count")?, expected);
    Ok(())
}

#[test]
fn missing_flow_log_fails() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let lookup = dir.file_path("lookup.csv");
    write_lines(&lookup, SAMPLE_LOOKUP_TABLE)?;

    let output = flowtag(&dir)
        .arg(dir.file_path("absent.log"))
        .arg(&lookup)
        .arg(dir.file_path("report.csv"))
        .output()?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("absent.log"));
    Ok(())
}
