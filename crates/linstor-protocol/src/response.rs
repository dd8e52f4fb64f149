//! API call responses: the controller's answer to every mutating request.

use std::fmt;

use serde::Serialize;

use crate::messages::MsgApiCallResponse;

/// Severity bits of a return code.
pub const MASK_ERROR: u64 = 0xC000_0000_0000_0000;
pub const MASK_WARN: u64 = 0x8000_0000_0000_0000;
pub const MASK_INFO: u64 = 0x4000_0000_0000_0000;

/// Severity of a single response entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Success,
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Classifies a return code by its two high bits.
    pub fn from_ret_code(ret_code: u64) -> Self {
        match ret_code & MASK_ERROR {
            MASK_ERROR => Self::Error,
            MASK_WARN => Self::Warning,
            MASK_INFO => Self::Info,
            _ => Self::Success,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

impl MsgApiCallResponse {
    /// Severity encoded in `ret_code`.
    pub fn severity(&self) -> Severity {
        Severity::from_ret_code(self.ret_code)
    }

    pub fn is_error(&self) -> bool {
        self.severity() == Severity::Error
    }

    pub fn is_warning(&self) -> bool {
        self.severity() == Severity::Warning
    }

    pub fn is_info(&self) -> bool {
        self.severity() == Severity::Info
    }

    pub fn is_success(&self) -> bool {
        self.severity() == Severity::Success
    }
}

impl fmt::Display for MsgApiCallResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.severity().label())?;
        let sections = [
            ("Description", &self.message),
            ("Cause", &self.cause),
            ("Correction", &self.correction),
            ("Details", &self.details),
        ];
        for (title, text) in sections {
            if text.is_empty() {
                continue;
            }
            writeln!(f, "{title}:")?;
            for line in text.lines() {
                writeln!(f, "    {line}")?;
            }
        }
        if !self.error_report_ids.is_empty() {
            writeln!(f, "Show reports:")?;
            for id in &self.error_report_ids {
                writeln!(f, "    linstor error-reports show {id}")?;
            }
        }
        Ok(())
    }
}

/// All responses carried by one `Reply` frame, in wire order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApiCallResponses(Vec<MsgApiCallResponse>);

impl ApiCallResponses {
    pub fn new(responses: Vec<MsgApiCallResponse>) -> Self {
        Self(responses)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MsgApiCallResponse> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether any entry is an error.
    pub fn has_errors(&self) -> bool {
        self.0.iter().any(MsgApiCallResponse::is_error)
    }

    /// Most severe entry level, `None` for an empty answer.
    pub fn worst_severity(&self) -> Option<Severity> {
        self.0.iter().map(MsgApiCallResponse::severity).max()
    }

    /// Only the error entries.
    pub fn errors(&self) -> impl Iterator<Item = &MsgApiCallResponse> {
        self.0.iter().filter(|r| r.is_error())
    }

    pub fn into_inner(self) -> Vec<MsgApiCallResponse> {
        self.0
    }
}

impl From<Vec<MsgApiCallResponse>> for ApiCallResponses {
    fn from(responses: Vec<MsgApiCallResponse>) -> Self {
        Self(responses)
    }
}

impl IntoIterator for ApiCallResponses {
    type Item = MsgApiCallResponse;
    type IntoIter = std::vec::IntoIter<MsgApiCallResponse>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ApiCallResponses {
    type Item = &'a MsgApiCallResponse;
    type IntoIter = std::slice::Iter<'a, MsgApiCallResponse>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for ApiCallResponses {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for response in &self.0 {
            write!(f, "{response}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(ret_code: u64, message: &str) -> MsgApiCallResponse {
        MsgApiCallResponse {
            ret_code,
            message: message.into(),
            ..Default::default()
        }
    }

    #[test]
    fn severity_from_high_bits() {
        assert_eq!(Severity::from_ret_code(0x0000_0000_0000_0001), Severity::Success);
        assert_eq!(Severity::from_ret_code(MASK_INFO | 3), Severity::Info);
        assert_eq!(Severity::from_ret_code(MASK_WARN | 3), Severity::Warning);
        assert_eq!(Severity::from_ret_code(MASK_ERROR | 3), Severity::Error);
    }

    #[test]
    fn errors_are_found() {
        let responses = ApiCallResponses::new(vec![
            response(1, "created"),
            response(MASK_WARN, "slow"),
            response(MASK_ERROR | 7, "failed"),
        ]);
        assert!(responses.has_errors());
        assert_eq!(responses.worst_severity(), Some(Severity::Error));
        assert_eq!(responses.errors().count(), 1);

        let ok = ApiCallResponses::new(vec![response(1, "created")]);
        assert!(!ok.has_errors());
        assert_eq!(ApiCallResponses::default().worst_severity(), None);
    }

    #[test]
    fn display_lists_sections() {
        let mut entry = response(MASK_ERROR, "Node 'alpha' not found");
        entry.cause = "No such node".into();
        entry.error_report_ids = vec!["5F3A-000001".into()];

        let text = entry.to_string();
        assert_eq!(
            text,
            "ERROR:\nDescription:\n    Node 'alpha' not found\nCause:\n    No such node\n\
             Show reports:\n    linstor error-reports show 5F3A-000001\n"
        );
    }

    #[test]
    fn serializes_as_plain_list() {
        let responses = ApiCallResponses::new(vec![response(MASK_ERROR | 3, "failed")]);
        let json = serde_json::to_value(&responses).unwrap();
        assert_eq!(json[0]["message"], "failed");
        assert_eq!(json[0]["ret_code"], MASK_ERROR | 3);
    }
}
