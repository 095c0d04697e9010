//! Tests for in-memory and generated table sources.

use flowtag::table::generator::ColumnFn;
use flowtag::{
    EmptyTable, FlowLogGenerator, MemorySink, MemoryTable, TableGenerator, TableSink, TableSource,
    row,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[test]
fn empty_table_has_no_rows() -> anyhow::Result<()> {
    assert_eq!(EmptyTable.rows()?.count(), 0);
    Ok(())
}

#[test]
fn memory_table_passes_are_fresh() -> anyhow::Result<()> {
    let table = MemoryTable::from_lines(&["a b", "c d"], " ");
    assert_eq!(table.len(), 2);
    let first: Vec<_> = table.rows()?.collect::<anyhow::Result<_>>()?;
    let second: Vec<_> = table.rows()?.collect::<anyhow::Result<_>>()?;
    assert_eq!(first, second);
    assert_eq!(first[1], row(&["c", "d"]));
    Ok(())
}

#[test]
fn generator_honours_row_limit() -> anyhow::Result<()> {
    let x: ColumnFn = Arc::new(|| "x".to_string());
    let y: ColumnFn = Arc::new(|| "y".to_string());
    let generator = TableGenerator::new(7, vec![x, y]);
    assert_eq!(generator.width(), 2);
    let rows: Vec<_> = generator.rows()?.collect::<anyhow::Result<_>>()?;
    assert_eq!(rows.len(), 7);
    assert!(rows.iter().all(|r| *r == row(&["x", "y"])));
    Ok(())
}

#[test]
fn generator_calls_closures_per_row_and_restarts() -> anyhow::Result<()> {
    let counter = Arc::new(AtomicU64::new(0));
    let next = Arc::clone(&counter);
    let column: ColumnFn = Arc::new(move || next.fetch_add(1, Ordering::SeqCst).to_string());
    let generator = TableGenerator::new(3, vec![column]);

    let first: Vec<_> = generator.rows()?.collect::<anyhow::Result<_>>()?;
    let second: Vec<_> = generator.rows()?.collect::<anyhow::Result<_>>()?;
    assert_eq!(first, vec![row(&["0"]), row(&["1"]), row(&["2"])]);
    assert_eq!(second.len(), 3);
    assert_eq!(counter.load(Ordering::SeqCst), 6);
    Ok(())
}

#[test]
fn unbounded_generator_is_lazy() -> anyhow::Result<()> {
    let column: ColumnFn = Arc::new(|| "z".to_string());
    let generator = TableGenerator::unbounded(vec![column]);
    assert_eq!(generator.limit(), None);
    assert_eq!(generator.rows()?.take(1_000).count(), 1_000);
    Ok(())
}

#[test]
fn flow_log_generator_fields_are_plausible() -> anyhow::Result<()> {
    let rows: Vec<_> = FlowLogGenerator::new(200)
        .rows()?
        .collect::<anyhow::Result<_>>()?;
    for columns in &rows {
        assert_eq!(columns.len(), FlowLogGenerator::COLUMNS);
        assert_eq!(columns[0], "2");
        let port: u16 = columns[6].parse()?;
        assert!(FlowLogGenerator::PORTS.contains(&port));
        let code: u8 = columns[7].parse()?;
        assert!(FlowLogGenerator::PROTOCOLS.contains(&code));
        assert!(columns[12] == "ACCEPT" || columns[12] == "REJECT");
        assert_eq!(columns[13], "OK");
    }
    Ok(())
}

#[test]
fn memory_sink_clones_share_rows() -> anyhow::Result<()> {
    let sink = MemorySink::new();
    let mut writer = sink.clone();
    writer.write_row(&["a", "1"])?;
    writer.blank()?;
    writer.close()?;
    assert_eq!(sink.lines(","), ["a,1", ""]);
    assert!(writer.write_row(&["late"]).is_err());
    Ok(())
}
