//! Simple example demonstrating how to use the log analyzer library

use anyhow::Result;
use mcmtest::LogAnalyzer;
use std::fs;

fn main() -> Result<()> {
    // Directory holding one job's logs
    let dir = tempfile::tempdir()?;

    fs::write(
        dir.path().join("out_EXO-RunIISummer20UL17wmLHEGEN-01234.txt"),
        "McM time_event: 0.85 sec\nMcM Size/event: 412.6 kB\n",
    )?;
    fs::write(
        dir.path().join("err_EXO-RunIISummer20UL17wmLHEGEN-01234.txt"),
        r#"After filter: final cross section = 3.871e+01 +- 2.1e-01 pb
Filter efficiency (event-level): 0.2456
"#,
    )?;

    let analyzer = LogAnalyzer::new(dir.path())?;
    let csv_path = dir.path().join("results.csv");
    let analysis = analyzer.export(&csv_path)?;

    for record in &analysis.records {
        println!(
            "{}: xsec={} pb, filter eff={}, match eff={}",
            record.prepid, record.cross_section_pb, record.filter_efficiency, record.match_efficiency
        );
    }
    for missing in &analysis.diagnostics {
        println!("missing: {}", missing);
    }

    println!("\n{}", fs::read_to_string(&csv_path)?);

    Ok(())
}
