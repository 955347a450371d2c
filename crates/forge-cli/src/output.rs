//! Result output formatting and writing.

use crate::orchestrator::{CorrelationOutcome, WaveformSummary};
use crate::OutputFormat;
use anyhow::{Context, Result};
use lib_ibis::{CompletionReport, TableRecord};
use lib_spice::{CorrelationStatus, SubcircuitDescriptor};
use lib_types::{format_si, WaveformSet};
use std::io::Write;
use std::path::{Path, PathBuf};

fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn status_name(status: &CorrelationStatus) -> &'static str {
    match status {
        CorrelationStatus::Skipped { .. } => "skipped",
        CorrelationStatus::Rendered => "rendered",
        CorrelationStatus::Completed { .. } => "completed",
        CorrelationStatus::SimulatorFailed { .. } => "simulator_failed",
        CorrelationStatus::Failed { .. } => "failed",
    }
}

fn status_detail(outcome: &CorrelationOutcome) -> String {
    if let Some(err) = &outcome.decode_error {
        return format!("waveform decode failed: {}", err);
    }
    match &outcome.result.status {
        CorrelationStatus::Skipped { reason } => reason.clone(),
        CorrelationStatus::Rendered => String::new(),
        CorrelationStatus::Completed { waveform } => waveform.display().to_string(),
        CorrelationStatus::SimulatorFailed { log, .. } => format!("see {}", log.display()),
        CorrelationStatus::Failed { message } => message.clone(),
    }
}

/// Completion summary.
pub fn write_completion<W: Write>(w: &mut W, report: &CompletionReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            writeln!(w, "Completion")?;
            writeln!(w, "==========")?;
            writeln!(w, "Linked pins:  {}", report.linked_pins)?;
            writeln!(w, "Filled slots: {}", report.filled_slots)?;
            writeln!(w, "Errors:       {}", report.errors.len())?;
            for error in &report.errors {
                writeln!(w, "  {}", error)?;
            }
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "linked_pins": report.linked_pins,
                "filled_slots": report.filled_slots,
                "errors": report.errors.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
            });
            writeln!(w, "{}", serde_json::to_string_pretty(&json)?)?;
        }
        OutputFormat::Csv => {
            writeln!(w, "error")?;
            for error in &report.errors {
                writeln!(w, "{}", csv_field(&error.to_string()))?;
            }
        }
    }
    Ok(())
}

/// Per-model correlation status table.
pub fn write_correlation<W: Write>(w: &mut W, outcomes: &[CorrelationOutcome], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            writeln!(w, "{:<24} {:<17} {:>5}  {}", "Model", "Status", "Code", "Detail")?;
            writeln!(w, "{}", "-".repeat(72))?;
            for o in outcomes {
                writeln!(
                    w,
                    "{:<24} {:<17} {:>5}  {}",
                    o.result.model,
                    status_name(&o.result.status),
                    o.result.status.code(),
                    status_detail(o)
                )?;
                if let Some(summary) = &o.waveform {
                    for s in &summary.signals {
                        writeln!(
                            w,
                            "{:<24}   {:<12} min {:>8}  max {:>8}  final {:>8}",
                            "",
                            s.name,
                            format_si(s.min),
                            format_si(s.max),
                            format_si(s.last)
                        )?;
                    }
                }
            }
            let failed = outcomes.iter().filter(|o| o.is_failure()).count();
            writeln!(w)?;
            writeln!(w, "{} models, {} failed", outcomes.len(), failed)?;
        }
        OutputFormat::Json => {
            writeln!(w, "{}", serde_json::to_string_pretty(outcomes)?)?;
        }
        OutputFormat::Csv => {
            writeln!(w, "model,status,code,deck,detail")?;
            for o in outcomes {
                let deck = o
                    .result
                    .deck
                    .as_ref()
                    .map(|d| d.display().to_string())
                    .unwrap_or_default();
                writeln!(
                    w,
                    "{},{},{},{},{}",
                    csv_field(&o.result.model),
                    status_name(&o.result.status),
                    o.result.status.code(),
                    csv_field(&deck),
                    csv_field(&status_detail(o))
                )?;
            }
        }
    }
    Ok(())
}

/// Write the correlation status table next to the decks.
pub fn write_correlation_summary(
    outcomes: &[CorrelationOutcome],
    output_dir: &Path,
    format: OutputFormat,
) -> Result<PathBuf> {
    let ext = match format {
        OutputFormat::Text => "txt",
        OutputFormat::Json => "json",
        OutputFormat::Csv => "csv",
    };
    let path = output_dir.join(format!("correlation_summary.{}", ext));

    let mut buf = Vec::new();
    write_correlation(&mut buf, outcomes, format)?;
    lib_types::write_atomic(&path, &buf).with_context(|| format!("Failed to write {:?}", path))?;

    tracing::info!("Wrote correlation summary to {:?}", path);
    Ok(path)
}

/// Prepared subcircuit.
pub fn write_subckt<W: Write>(w: &mut W, subckt: &SubcircuitDescriptor, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            writeln!(w, "Subcircuit: {}", subckt.name)?;
            writeln!(w, "  Pins:        {}", subckt.pins.join(" "))?;
            writeln!(w, "  Source:      {}", subckt.source.display())?;
            writeln!(w, "  Synthesized: {}", if subckt.synthesized { "yes" } else { "no" })?;
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "name": subckt.name,
                "pins": subckt.pins,
                "source": subckt.source,
                "synthesized": subckt.synthesized,
            });
            writeln!(w, "{}", serde_json::to_string_pretty(&json)?)?;
        }
        OutputFormat::Csv => {
            writeln!(w, "position,pin")?;
            for (i, pin) in subckt.pins.iter().enumerate() {
                writeln!(w, "{},{}", i + 1, csv_field(pin))?;
            }
        }
    }
    Ok(())
}

/// Decoded waveform: a summary as text or JSON, every sample as CSV.
pub fn write_waveform<W: Write>(w: &mut W, set: &WaveformSet, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            let summary = WaveformSummary::from_set(set);
            writeln!(w, "Signals:  {}", set.signal_count())?;
            writeln!(w, "Samples:  {}", summary.samples)?;
            writeln!(w, "Duration: {}s", format_si(summary.duration))?;
            for s in &summary.signals {
                writeln!(
                    w,
                    "  {:<16} min {:>8}  max {:>8}  final {:>8}",
                    s.name,
                    format_si(s.min),
                    format_si(s.max),
                    format_si(s.last)
                )?;
            }
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "summary": WaveformSummary::from_set(set),
                "time": set.time,
                "signals": set.traces,
            });
            writeln!(w, "{}", serde_json::to_string_pretty(&json)?)?;
        }
        OutputFormat::Csv => {
            let header: Vec<String> = std::iter::once("time".to_string())
                .chain(set.names().map(csv_field))
                .collect();
            writeln!(w, "{}", header.join(","))?;
            for (i, t) in set.time.iter().enumerate() {
                let row: Vec<String> = std::iter::once(t.to_string())
                    .chain(set.traces.iter().map(|tr| tr.values[i].to_string()))
                    .collect();
                writeln!(w, "{}", row.join(","))?;
            }
        }
    }
    Ok(())
}

/// Table listing; `show_data` adds the numeric rows.
pub fn write_tables<W: Write>(
    w: &mut W,
    records: &[&TableRecord],
    show_data: bool,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Text => {
            writeln!(w, "{:>4}  {:<24} {:<20} {:>6} {:>5}  {}", "#", "Section", "Model", "Rows", "Cols", "Lines")?;
            for r in records {
                writeln!(
                    w,
                    "{:>4}  {:<24} {:<20} {:>6} {:>5}  {}-{}",
                    r.index,
                    r.section_raw,
                    r.model.as_deref().unwrap_or("-"),
                    r.nrows(),
                    r.ncols(),
                    r.line_start,
                    r.line_end
                )?;
                for (key, value) in &r.params {
                    writeln!(w, "        {} = {}", key, value)?;
                }
                if show_data {
                    for row in r.data.rows() {
                        let cells: Vec<String> = row.iter().map(|v| format_si(*v)).collect();
                        writeln!(w, "        {}", cells.join("  "))?;
                    }
                }
            }
        }
        OutputFormat::Json => {
            let json: Vec<_> = records
                .iter()
                .map(|r| {
                    let mut entry = serde_json::json!({
                        "index": r.index,
                        "section": r.section,
                        "section_raw": r.section_raw,
                        "model": r.model,
                        "params": r.params,
                        "rows": r.nrows(),
                        "cols": r.ncols(),
                        "line_start": r.line_start,
                        "line_end": r.line_end,
                    });
                    if show_data {
                        let rows: Vec<Vec<f64>> = r.data.rows().into_iter().map(|row| row.to_vec()).collect();
                        entry["data"] = serde_json::json!(rows);
                    }
                    entry
                })
                .collect();
            writeln!(w, "{}", serde_json::to_string_pretty(&json)?)?;
        }
        OutputFormat::Csv => {
            if show_data {
                writeln!(w, "index,section,model,row,values")?;
                for r in records {
                    let model = csv_field(r.model.as_deref().unwrap_or(""));
                    for (i, row) in r.data.rows().into_iter().enumerate() {
                        let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
                        writeln!(w, "{},{},{},{},{}", r.index, r.section, model, i + 1, cells.join(","))?;
                    }
                }
            } else {
                writeln!(w, "index,section,model,rows,cols,line_start,line_end")?;
                for r in records {
                    writeln!(
                        w,
                        "{},{},{},{},{},{},{}",
                        r.index,
                        r.section,
                        csv_field(r.model.as_deref().unwrap_or("")),
                        r.nrows(),
                        r.ncols(),
                        r.line_start,
                        r.line_end
                    )?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_spice::CorrelationResult;
    use lib_types::Trace;

    fn outcome(model: &str, status: CorrelationStatus) -> CorrelationOutcome {
        CorrelationOutcome {
            result: CorrelationResult {
                model: model.into(),
                status,
                deck: Some(PathBuf::from("out/corr_x.sp")),
            },
            waveform: None,
            decode_error: None,
        }
    }

    fn render(f: impl FnOnce(&mut Vec<u8>) -> Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_correlation_formats() {
        let outcomes = vec![
            outcome("DQ", CorrelationStatus::Rendered),
            outcome(
                "OE,B",
                CorrelationStatus::SimulatorFailed {
                    code: 3,
                    log: PathBuf::from("out/corr_oe_b.lis"),
                },
            ),
        ];

        let text = render(|w| write_correlation(w, &outcomes, OutputFormat::Text));
        assert!(text.contains("simulator_failed"));
        assert!(text.contains("2 models, 1 failed"));

        let csv = render(|w| write_correlation(w, &outcomes, OutputFormat::Csv));
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "model,status,code,deck,detail");
        assert!(lines[2].starts_with("\"OE,B\",simulator_failed,3,"));

        let json = render(|w| write_correlation(w, &outcomes, OutputFormat::Json));
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[1]["status"]["status"], "simulator_failed");
        assert_eq!(value[1]["status"]["code"], 3);
        assert_eq!(value[0]["model"], "DQ");
    }

    #[test]
    fn test_waveform_csv() {
        let set = WaveformSet::new(
            vec![0.0, 1.0],
            vec![
                Trace { name: "a".into(), values: vec![0.5, 1.5] },
                Trace { name: "b".into(), values: vec![2.0, 3.0] },
            ],
        )
        .unwrap();

        let csv = render(|w| write_waveform(w, &set, OutputFormat::Csv));
        assert_eq!(csv, "time,a,b\n0,0.5,2\n1,1.5,3\n");

        let text = render(|w| write_waveform(w, &set, OutputFormat::Text));
        assert!(text.contains("Signals:  2"));
    }

    #[test]
    fn test_summary_file() {
        let dir = tempfile::tempdir().unwrap();
        let outcomes = vec![outcome("DQ", CorrelationStatus::Rendered)];

        let path = write_correlation_summary(&outcomes, dir.path(), OutputFormat::Csv).unwrap();
        assert_eq!(path.file_name().unwrap(), "correlation_summary.csv");
        assert!(std::fs::read_to_string(path).unwrap().contains("DQ,rendered,0"));
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
