use std::{collections::BTreeMap, fmt};

/// Classification statistics accumulated over a labeled evaluation set
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
    /// Class labels, indexed by class id
    labels: Vec<String>,

    /// `matrix[actual][predicted]` counts
    matrix: Vec<Vec<usize>>,
}

impl Evaluation {
    /// An empty confusion matrix over the given label enumeration
    pub fn new(id2label: &BTreeMap<usize, String>) -> Self {
        let labels: Vec<String> = id2label.values().cloned().collect();
        let n = labels.len();

        Self {
            labels,
            matrix: vec![vec![0; n]; n],
        }
    }

    /// Record a single prediction. Ids outside the label range are ignored.
    pub fn record(&mut self, actual: usize, predicted: usize) {
        if let Some(count) = self
            .matrix
            .get_mut(actual)
            .and_then(|row| row.get_mut(predicted))
        {
            *count += 1;
        }
    }

    /// Record parallel lists of actual and predicted class ids
    pub fn record_all(&mut self, actual: &[usize], predicted: &[usize]) {
        for (&a, &p) in actual.iter().zip(predicted) {
            self.record(a, p);
        }
    }

    /// Class labels, indexed by class id
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// The confusion matrix, rows are actual classes and columns predicted ones
    pub fn confusion_matrix(&self) -> &[Vec<usize>] {
        &self.matrix
    }

    /// Number of recorded examples
    pub fn total(&self) -> usize {
        self.matrix.iter().flatten().sum()
    }

    fn correct(&self) -> usize {
        (0..self.labels.len()).map(|i| self.matrix[i][i]).sum()
    }

    fn predicted(&self, class: usize) -> usize {
        self.matrix.iter().map(|row| row[class]).sum()
    }

    fn actual(&self, class: usize) -> usize {
        self.matrix[class].iter().sum()
    }

    /// Fraction of correct predictions
    pub fn accuracy(&self) -> f64 {
        ratio(self.correct(), self.total())
    }

    /// Of the examples predicted as `class`, the fraction that really are
    pub fn precision(&self, class: usize) -> f64 {
        ratio(self.matrix[class][class], self.predicted(class))
    }

    /// Of the examples of `class`, the fraction predicted as such
    pub fn recall(&self, class: usize) -> f64 {
        ratio(self.matrix[class][class], self.actual(class))
    }

    /// Harmonic mean of precision and recall
    pub fn f1(&self, class: usize) -> f64 {
        let precision = self.precision(class);
        let recall = self.recall(class);

        if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        }
    }

    /// Unweighted mean of a per-class statistic over every class
    fn macro_average(&self, stat: impl Fn(usize) -> f64) -> f64 {
        let n = self.labels.len();

        if n == 0 {
            return 0.0;
        }

        (0..n).map(stat).sum::<f64>() / n as f64
    }

    /// Macro-averaged precision
    pub fn macro_precision(&self) -> f64 {
        self.macro_average(|class| self.precision(class))
    }

    /// Macro-averaged recall
    pub fn macro_recall(&self) -> f64 {
        self.macro_average(|class| self.recall(class))
    }

    /// Macro-averaged F1
    pub fn macro_f1(&self) -> f64 {
        self.macro_average(|class| self.f1(class))
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .labels
            .iter()
            .map(String::len)
            .max()
            .unwrap_or(0)
            .max(8);

        writeln!(f, "Examples:  {}", self.total())?;
        writeln!(f, "Accuracy:  {:.4}", self.accuracy())?;
        writeln!(f, "Precision: {:.4}", self.macro_precision())?;
        writeln!(f, "Recall:    {:.4}", self.macro_recall())?;
        writeln!(f, "F1 Score:  {:.4}", self.macro_f1())?;
        writeln!(f)?;

        writeln!(
            f,
            "{:<width$} {:>9} {:>9} {:>9} {:>7}",
            "label", "precision", "recall", "f1", "support"
        )?;

        for (class, label) in self.labels.iter().enumerate() {
            writeln!(
                f,
                "{:<width$} {:>9.4} {:>9.4} {:>9.4} {:>7}",
                label,
                self.precision(class),
                self.recall(class),
                self.f1(class),
                self.actual(class)
            )?;
        }

        writeln!(f)?;
        writeln!(f, "Confusion matrix (rows: actual, columns: predicted)")?;

        for (label, row) in self.labels.iter().zip(&self.matrix) {
            let counts: Vec<String> = row.iter().map(|count| format!("{count:>5}")).collect();

            writeln!(f, "{:<width$} {}", label, counts.join(" "))?;
        }

        Ok(())
    }
}
