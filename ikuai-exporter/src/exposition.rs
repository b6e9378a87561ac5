use std::fmt::Write;

use axum::{
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};

use crate::metric::{Family, HistogramValue, MetricDesc, Registry, Sample, Value};

/// Content type of the Prometheus text format, version 0.0.4.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Samples rendered in the Prometheus text exposition format.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Exposition(pub String);

impl Exposition {
    /// Render `samples` grouped by family, in the order of the descriptor table.
    ///
    /// Families without samples are left out entirely. Histogram samples with
    /// identical labels are merged into one series.
    pub fn encode(registry: &Registry, samples: &[Sample]) -> Self {
        let mut out = String::with_capacity(samples.len() * 64);

        for family in Family::ALL {
            let mut series = samples.iter().filter(|s| s.family == family).peekable();
            if series.peek().is_none() {
                continue;
            }

            let desc = registry.desc(family);
            let _ = writeln!(out, "# HELP {} {}", desc.name, escape_help(desc.help));
            let _ = writeln!(out, "# TYPE {} {}", desc.name, desc.kind.as_str());

            let mut histograms: Vec<(&[String], HistogramValue)> = Vec::new();
            for sample in series {
                match &sample.value {
                    Value::Gauge(v) | Value::Counter(v) => {
                        write_line(&mut out, desc.name, desc, &sample.labels, None, *v)
                    }
                    Value::Histogram(h) => {
                        match histograms.iter_mut().find(|(l, _)| *l == sample.labels.as_slice()) {
                            Some((_, merged)) => merged.merge(h),
                            None => histograms.push((sample.labels.as_slice(), h.clone())),
                        }
                    }
                }
            }

            for (labels, hist) in &histograms {
                write_histogram(&mut out, desc, labels, hist);
            }
        }

        Exposition(out)
    }
}

fn write_histogram(out: &mut String, desc: &MetricDesc, labels: &[String], hist: &HistogramValue) {
    let bucket = format!("{}_bucket", desc.name);
    for (bound, count) in &hist.buckets {
        write_line(out, &bucket, desc, labels, Some(*bound), *count as f64);
    }
    write_line(out, &bucket, desc, labels, Some(f64::INFINITY), hist.count as f64);
    write_line(out, &format!("{}_sum", desc.name), desc, labels, None, hist.sum);
    write_line(out, &format!("{}_count", desc.name), desc, labels, None, hist.count as f64);
}

fn write_line(
    out: &mut String,
    name: &str,
    desc: &MetricDesc,
    labels: &[String],
    le: Option<f64>,
    value: f64,
) {
    out.push_str(name);

    if !labels.is_empty() || le.is_some() {
        out.push('{');
        let mut first = true;
        for (key, value) in desc.labels.iter().zip(labels) {
            if !first {
                out.push(',');
            }
            first = false;
            let _ = write!(out, "{key}=\"{}\"", escape_label(value));
        }
        if let Some(le) = le {
            if !first {
                out.push(',');
            }
            let _ = write!(out, "le=\"{}\"", format_float(le));
        }
        out.push('}');
    }

    let _ = writeln!(out, " {}", format_float(value));
}

fn escape_label(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

fn format_float(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_owned()
    } else if v == f64::INFINITY {
        "+Inf".to_owned()
    } else if v == f64::NEG_INFINITY {
        "-Inf".to_owned()
    } else {
        v.to_string()
    }
}

impl IntoResponse for Exposition {
    fn into_response(self) -> Response {
        (
            [(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE))],
            self.0,
        )
            .into_response()
    }
}
