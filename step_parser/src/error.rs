use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChartErrorKind {
    Parse,
    NoEligibleChart,
    MissingInitialTempo,
    Decode,
    Unexpected,
}

impl ChartErrorKind {
    pub(crate) fn from_code(code: &'static str) -> Self {
        match code {
            // Parse
            "E1001" | "E1002" | "E1003" | "E1004" | "E1005" => Self::Parse,

            // Decode
            "E2002" => Self::Decode,

            // Tempo
            "E3001" => Self::MissingInitialTempo,

            // Chart selection
            "E4001" => Self::NoEligibleChart,

            // E2001 (read), E2003 (encoding label), E2004 (options), E5xxx (malformed rows, builder)
            _ => Self::Unexpected,
        }
    }

    /// One-character progress mark used by batch runs.
    pub fn progress_mark(self) -> char {
        match self {
            Self::NoEligibleChart => '0',
            _ => 'X',
        }
    }
}

#[derive(Debug, Error, Clone)]
#[error("{code}: {message}")]
pub struct ChartError {
    pub code: &'static str,
    pub kind: ChartErrorKind,
    pub message: String,

    pub file: Option<String>,
    pub difficulty: Option<String>,
    pub measure: Option<usize>,
    pub row: Option<usize>,
    pub context: Option<String>,
}

impl ChartError {
    pub(crate) fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            kind: ChartErrorKind::from_code(code),
            message: message.into(),

            file: None,
            difficulty: None,
            measure: None,
            row: None,
            context: None,
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_difficulty(mut self, difficulty: impl Into<String>) -> Self {
        self.difficulty = Some(difficulty.into());
        self
    }

    pub fn with_measure(mut self, measure: usize) -> Self {
        self.measure = Some(measure);
        self
    }

    pub fn with_row(mut self, row: usize) -> Self {
        self.row = Some(row);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn is_unexpected(&self) -> bool {
        self.kind == ChartErrorKind::Unexpected
    }

    /// Single line with everything needed to reproduce the failure.
    pub fn log_line(&self) -> String {
        let mut line = format!("{:?} {self}", self.kind);
        if let Some(file) = &self.file {
            line.push_str(&format!(" file={file}"));
        }
        if let Some(difficulty) = &self.difficulty {
            line.push_str(&format!(" difficulty={difficulty}"));
        }
        if let Some(measure) = self.measure {
            line.push_str(&format!(" measure={measure}"));
        }
        if let Some(row) = self.row {
            line.push_str(&format!(" row={row}"));
        }
        if let Some(context) = &self.context {
            line.push_str(&format!(" context={context:?}"));
        }
        line
    }
}
