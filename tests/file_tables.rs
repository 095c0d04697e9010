//! Tests for the file-backed table reader and writer.

use flowtag::testing::{SAMPLE_FLOW_LOG, TempDirPath, read_lines, write_lines};
use flowtag::{
    ReadOptions, Release, Row, Rows, TableFileReader, TableFileWriter, TableSink, TableSource,
    release_all, row,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn reads_rows_in_file_order() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let path = dir.file_path("flow_log.log");
    write_lines(&path, SAMPLE_FLOW_LOG)?;

    let reader = TableFileReader::open(&path)?;
    assert_eq!(reader.separator(), " ");
    assert!(!reader.has_header());

    let rows: Vec<_> = reader.rows()?.collect::<anyhow::Result<_>>()?;
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|r| r.len() == 14));
    assert_eq!(rows[0][6], "23");
    assert_eq!(rows[4][6], "993");
    Ok(())
}

#[test]
fn header_and_empty_lines_are_skipped() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let path = dir.file_path("lookup.csv");
    write_lines(&path, &["dstport,protocol,tag", "", "25,tcp,sv_P1", "", "443,tcp,sv_P2\r"])?;

    let reader = TableFileReader::open(&path)?;
    assert!(reader.has_header());
    let rows: Vec<_> = reader.rows()?.collect::<anyhow::Result<_>>()?;
    assert_eq!(rows, vec![row(&["25", "tcp", "sv_P1"]), row(&["443", "tcp", "sv_P2"])]);
    Ok(())
}

#[test]
fn explicit_options_override_inference() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let path = dir.file_path("lookup.csv");
    write_lines(&path, &["dstport;protocol;tag", "25;tcp;sv_P1"])?;

    let reader =
        TableFileReader::with_options(&path, ReadOptions::default().separator(";").has_header(false))?;
    let rows: Vec<_> = reader.rows()?.collect::<anyhow::Result<_>>()?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], row(&["dstport", "protocol", "tag"]));

    assert!(TableFileReader::with_options(&path, ReadOptions::default().separator("")).is_err());
    Ok(())
}

#[test]
fn empty_fields_are_kept() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let path = dir.file_path("sparse.csv");
    write_lines(&path, &["1,,3,"])?;
    let rows: Vec<_> = TableFileReader::open(&path)?
        .rows()?
        .collect::<anyhow::Result<_>>()?;
    assert_eq!(rows, vec![row(&["1", "", "3", ""])]);
    Ok(())
}

#[test]
fn each_pass_is_independent() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let path = dir.file_path("numbers.csv");
    write_lines(&path, &["1,a", "2,b", "3,c"])?;
    let reader = TableFileReader::open(&path)?;

    let mut first = reader.rows()?;
    let _ = first.next();
    let second: Vec<_> = reader.rows()?.collect::<anyhow::Result<_>>()?;
    assert_eq!(second.len(), 3);
    assert_eq!(first.count(), 2);
    Ok(())
}

#[test]
fn file_is_released_after_last_row() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let path = dir.file_path("numbers.csv");
    write_lines(&path, &["1,a", "2,b"])?;

    let mut rows = TableFileReader::open(&path)?.open_rows()?;
    assert!(rows.is_open());
    assert!(rows.next().is_some());
    assert!(rows.is_open());
    assert!(rows.next().is_some());
    // The final row was handed out; nothing is left to read.
    assert!(!rows.is_open());
    assert!(rows.next().is_none());
    Ok(())
}

#[test]
fn abandoned_pass_can_be_closed() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let path = dir.file_path("numbers.csv");
    write_lines(&path, &["1,a", "2,b", "3,c"])?;

    let mut rows = TableFileReader::open(&path)?.open_rows()?;
    assert!(rows.next().is_some());
    rows.release()?;
    assert!(!rows.is_open());
    assert!(rows.next().is_none());
    Ok(())
}

/// Source whose passes record when their backing state is dropped.
#[derive(Default)]
struct CountingSource {
    released: Arc<AtomicUsize>,
}

struct ReleaseOnDrop(Arc<AtomicUsize>);

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl TableSource for CountingSource {
    fn rows(&self) -> anyhow::Result<Rows> {
        let guard = ReleaseOnDrop(Arc::clone(&self.released));
        Ok(Rows::new((0..10).map(move |i| {
            let _held = &guard;
            Ok::<Row, anyhow::Error>(row(&[i.to_string()]))
        })))
    }
}

#[test]
fn dropping_a_partial_pass_releases_it() -> anyhow::Result<()> {
    let source = CountingSource::default();
    {
        let mut rows = source.rows()?;
        assert!(rows.next().is_some());
        assert!(rows.next().is_some());
        assert_eq!(source.released.load(Ordering::SeqCst), 0);
    }
    assert_eq!(source.released.load(Ordering::SeqCst), 1);

    let mut rows = source.rows()?;
    assert!(rows.next().is_some());
    rows.close();
    assert_eq!(source.released.load(Ordering::SeqCst), 2);

    let first = source.rows()?.take(3).count();
    assert_eq!(first, 3);
    assert_eq!(source.released.load(Ordering::SeqCst), 3);
    Ok(())
}

#[test]
fn dropping_a_partial_file_pass_closes_the_file() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let path = dir.file_path("numbers.csv");
    write_lines(&path, &["1,a", "2,b", "3,c"])?;
    let reader = TableFileReader::open(&path)?;

    let mut rows = reader.rows()?;
    assert_eq!(rows.next().transpose()?, Some(row(&["1", "a"])));
    drop(rows);

    let again: Vec<_> = reader.rows()?.collect::<anyhow::Result<_>>()?;
    assert_eq!(again.len(), 3);
    Ok(())
}

#[test]
fn unreadable_path_fails_at_construction() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let error = TableFileReader::open(dir.file_path("missing.csv")).expect_err("missing file");
    assert!(format!("{error:#}").contains("missing.csv"));
    Ok(())
}

#[test]
fn writer_joins_with_inferred_separator() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let path = dir.file_path("out/report.csv");

    let mut writer = TableFileWriter::create(&path)?;
    assert_eq!(writer.separator(), ",");
    writer.write_row(&["Tag", "Count"])?;
    writer.blank()?;
    writer.accept(&mut vec![row(&["sv_P1", "2"]), row(&["Untagged", "9"])].into_iter())?;
    assert_eq!(writer.rows_written(), 4);
    writer.close()?;

    assert_eq!(read_lines(&path)?, ["Tag,Count", "", "sv_P1,2", "Untagged,9"]);
    Ok(())
}

#[test]
fn writer_create_truncates_and_append_extends() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let path = dir.file_path("log.tsv");
    write_lines(&path, &["stale"])?;

    let mut writer = TableFileWriter::create(&path)?;
    writer.write_row(&["a", "b"])?;
    writer.close()?;

    let mut writer = TableFileWriter::append(&path)?;
    writer.write_row(&["c", "d"])?;
    writer.close()?;

    assert_eq!(read_lines(&path)?, ["a\tb", "c\td"]);
    Ok(())
}

#[test]
fn writes_after_close_fail_and_close_is_idempotent() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let mut writer = TableFileWriter::with_separator(dir.file_path("out.txt"), "|")?;
    writer.write_row(&["x", "y"])?;
    writer.close()?;
    assert!(!writer.is_open());
    assert!(writer.write_row(&["z"]).is_err());
    writer.close()?;

    assert_eq!(read_lines(&dir.file_path("out.txt"))?, ["x|y"]);
    Ok(())
}

#[test]
fn written_file_reads_back() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let path = dir.file_path("lookup.psv");

    let mut writer = TableFileWriter::create(&path)?;
    writer.write_row(&["dstport", "protocol", "tag"])?;
    writer.write_row(&["80", "tcp", "web"])?;
    release_all(&mut [&mut writer]);

    let reader = TableFileReader::open(&path)?;
    assert_eq!(reader.separator(), "|");
    let rows: Vec<_> = reader.rows()?.collect::<anyhow::Result<_>>()?;
    assert_eq!(rows, vec![row(&["80", "tcp", "web"])]);
    Ok(())
}
