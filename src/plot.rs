use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlotKind {
    Line,
    Scatter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub label: String,
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
}

/// Chart data handed to an external renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct Plot {
    pub kind: PlotKind,
    pub series: Vec<Series>,
}

impl Plot {
    /// A single series; `xs` defaults to `1..=len` when absent. Returns
    /// `None` when both axes are given with different lengths.
    pub fn single(kind: PlotKind, label: String, xs: Option<Vec<f64>>, ys: Vec<f64>) -> Option<Plot> {
        let xs = match xs {
            Some(xs) if xs.len() != ys.len() => return None,
            Some(xs) => xs,
            None => (1..=ys.len()).map(|i| i as f64).collect(),
        };
        Some(Plot {
            kind,
            series: vec![Series { label, xs, ys }],
        })
    }

    pub fn points(&self) -> usize {
        self.series.iter().map(|s| s.ys.len()).sum()
    }
}

impl fmt::Display for Plot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            PlotKind::Line => "line plot",
            PlotKind::Scatter => "scatter plot",
        };
        let labels: Vec<&str> = self.series.iter().map(|s| s.label.as_str()).collect();
        write!(f, "{kind} of {} ({} points)", labels.join(", "), self.points())
    }
}
