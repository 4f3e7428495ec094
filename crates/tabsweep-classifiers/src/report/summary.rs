//! HTML summary of a finished sweep.
use maud::{html, Markup, DOCTYPE};

use crate::runner::ExperimentTable;

fn metric(value: f64) -> String {
    format!("{:.4}", value)
}

fn optional_metric(value: Option<f64>) -> String {
    value.map(metric).unwrap_or_else(|| "n/a".to_string())
}

const STYLE: &str = "body{font-family:sans-serif;margin:2em}\
    table{border-collapse:collapse}\
    th,td{border:1px solid #ccc;padding:4px 8px;text-align:right}\
    th{background:#f0f0f0}\
    td.name{text-align:left}";

fn records_table(table: &ExperimentTable) -> Markup {
    html! {
        table {
            thead {
                tr {
                    th { "Dataset" }
                    th { "Model" }
                    th { "Accuracy" }
                    th { "Macro F1" }
                    th { "Weighted F1" }
                    th { "Macro precision" }
                    th { "Macro recall" }
                    th { "Macro AUC" }
                    th { "Macro PR-AUC" }
                    th { "Confusion matrix" }
                }
            }
            tbody {
                @for record in &table.records {
                    tr {
                        td.name { (record.dataset) }
                        td.name { (record.model) }
                        td { (metric(record.accuracy)) }
                        td { (metric(record.macro_f1)) }
                        td { (metric(record.weighted_f1)) }
                        td { (metric(record.macro_precision)) }
                        td { (metric(record.macro_recall)) }
                        td { (optional_metric(record.macro_auc)) }
                        td { (optional_metric(record.macro_pr_auc)) }
                        td.name {
                            @if let Some(path) = &record.confusion_matrix_artifact_ref {
                                a href=(path) { "plot" }
                            } @else {
                                "-"
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Render every record and failure of a sweep as a standalone HTML page.
pub fn render_sweep_report(table: &ExperimentTable) -> String {
    let generated = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let markup = html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                title { "Classifier sweep report" }
                style { (STYLE) }
            }
            body {
                h1 { "Classifier sweep report" }
                p { "Generated " (generated) ". "
                    (table.records.len()) " successful runs, "
                    (table.failures.len()) " failed." }
                h2 { "Results" }
                @if table.records.is_empty() {
                    p { "No run completed." }
                } @else {
                    (records_table(table))
                }
                @if !table.failures.is_empty() {
                    h2 { "Failed runs" }
                    ul {
                        @for failure in &table.failures {
                            li {
                                strong { (failure.dataset) " / " (failure.model) }
                                ": " (failure.error)
                            }
                        }
                    }
                }
            }
        }
    };
    markup.into_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelKind;
    use crate::runner::{ExperimentRecord, RunFailure};

    fn record(dataset: &str, model: ModelKind) -> ExperimentRecord {
        ExperimentRecord {
            dataset: dataset.to_string(),
            model,
            accuracy: 0.5,
            macro_f1: 0.25,
            weighted_f1: 0.3,
            macro_precision: 0.4,
            macro_recall: 0.45,
            macro_auc: None,
            macro_pr_auc: Some(0.6),
            undefined_metrics: vec!["macro_auc".to_string()],
            dropped_classes: Vec::new(),
            n_train: 8,
            n_test: 2,
            confusion_matrix_artifact_ref: None,
            feature_importance_artifact: None,
        }
    }

    #[test]
    fn report_lists_records_and_failures() {
        let table = ExperimentTable {
            records: vec![record("d1", ModelKind::Gbdt)],
            failures: vec![RunFailure {
                dataset: "d2".to_string(),
                model: ModelKind::HistGb,
                error: "data error: <empty> partition".to_string(),
            }],
        };
        let html = render_sweep_report(&table);
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("d1"));
        assert!(html.contains("0.2500"));
        assert!(html.contains("n/a"));
        assert!(html.contains("Failed runs"));
        // error text is escaped
        assert!(html.contains("&lt;empty&gt;"));
    }
}
