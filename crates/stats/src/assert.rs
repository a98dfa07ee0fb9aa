//! Assertion parsing and evaluation.
//!
//! Assertions are small comparisons against the run summary, written as
//! `"<metric> <op> <value>[unit]"`, e.g. `p99 < 500ms` or
//! `error_rate < 1%`. Seconds convert to milliseconds at parse time.

use std::sync::OnceLock;

use regex::Regex;

use stress_domain::events::SummaryEvent;

/// Comparison operators, longest-match first in the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
}

impl CompareOp {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "<" => Some(Self::Lt),
            ">" => Some(Self::Gt),
            "<=" => Some(Self::Le),
            ">=" => Some(Self::Ge),
            "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }

    fn apply(self, actual: f64, expected: f64) -> bool {
        match self {
            Self::Lt => actual < expected,
            Self::Gt => actual > expected,
            Self::Le => actual <= expected,
            Self::Ge => actual >= expected,
            Self::Eq => actual == expected,
            Self::Ne => actual != expected,
        }
    }
}

/// Errors raised while parsing an assertion expression.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AssertionParseError {
    #[error("malformed assertion: {0:?} (expected \"<metric> <op> <value>[unit]\")")]
    Malformed(String),

    #[error("invalid number in assertion: {0:?}")]
    BadValue(String),
}

/// A parsed assertion. `value` is already unit-converted (s -> ms).
#[derive(Debug, Clone, PartialEq)]
pub struct Assertion {
    pub metric: String,
    pub op: CompareOp,
    pub value: f64,
    pub unit: String,
    /// Original expression, for reporting.
    pub raw: String,
}

/// Outcome of evaluating one assertion against a summary.
#[derive(Debug, Clone)]
pub struct AssertionResult {
    pub assertion: Assertion,
    pub actual: f64,
    pub passed: bool,
}

fn assertion_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*([a-z][a-z0-9_]*)\s*(<=|>=|==|!=|<|>)\s*(-?[0-9]+(?:\.[0-9]+)?)\s*(ms|s|%)?\s*$")
            .expect("assertion regex is valid")
    })
}

impl Assertion {
    /// Parse `"p99 < 500ms"` and friends. Unknown metrics parse fine and
    /// fail at evaluation with `actual = NaN`.
    pub fn parse(input: &str) -> Result<Self, AssertionParseError> {
        let caps = assertion_regex()
            .captures(input)
            .ok_or_else(|| AssertionParseError::Malformed(input.to_string()))?;

        let metric = caps[1].to_string();
        let op = CompareOp::parse(&caps[2])
            .ok_or_else(|| AssertionParseError::Malformed(input.to_string()))?;
        let number: f64 = caps[3]
            .parse()
            .map_err(|_| AssertionParseError::BadValue(caps[3].to_string()))?;
        let unit = caps.get(4).map(|m| m.as_str()).unwrap_or("").to_string();

        let value = if unit == "s" { number * 1_000.0 } else { number };

        Ok(Self {
            metric,
            op,
            value,
            unit,
            raw: input.trim().to_string(),
        })
    }

    /// Evaluate against a summary. A metric the summary does not expose
    /// yields `actual = NaN`, which fails every comparison.
    pub fn evaluate(&self, summary: &SummaryEvent) -> AssertionResult {
        let actual = match self.metric.as_str() {
            "rps" => summary.requests_per_second,
            "p50" => summary.overall.p50,
            "p95" => summary.overall.p95,
            "p99" => summary.overall.p99,
            "min" => summary.overall.min,
            "max" => summary.overall.max,
            "mean" => summary.overall.mean,
            "error_rate" => summary.error_rate(),
            "errors" => summary.total_errors as f64,
            "requests" => summary.total_requests as f64,
            _ => f64::NAN,
        };
        AssertionResult {
            assertion: self.clone(),
            actual,
            passed: self.op.apply(actual, self.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stress_domain::events::LatencyStats;

    fn summary() -> SummaryEvent {
        let mut s = SummaryEvent::empty();
        s.total_requests = 200;
        s.total_errors = 2;
        s.duration_ms = 10_000;
        s.requests_per_second = 20.0;
        s.overall = LatencyStats {
            min: 1.0,
            max: 400.0,
            mean: 42.0,
            p50: 30.0,
            p95: 120.0,
            p99: 350.0,
        };
        s
    }

    #[test]
    fn parses_latency_assertion() {
        let a = Assertion::parse("p99 < 500ms").unwrap();
        assert_eq!(a.metric, "p99");
        assert_eq!(a.op, CompareOp::Lt);
        assert_eq!(a.value, 500.0);
        assert_eq!(a.unit, "ms");
    }

    #[test]
    fn seconds_convert_to_millis() {
        let a = Assertion::parse("p50 < 2s").unwrap();
        assert_eq!(a.value, 2_000.0);
    }

    #[test]
    fn percent_unit_is_kept_verbatim() {
        let a = Assertion::parse("error_rate < 1%").unwrap();
        assert_eq!(a.value, 1.0);
        assert_eq!(a.unit, "%");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            Assertion::parse("garbage"),
            Err(AssertionParseError::Malformed(_))
        ));
        assert!(Assertion::parse("p99 < abc").is_err());
        assert!(Assertion::parse("").is_err());
    }

    #[test]
    fn all_operators_parse() {
        for op in ["<", ">", "<=", ">=", "==", "!="] {
            let a = Assertion::parse(&format!("rps {op} 5")).unwrap();
            assert_eq!(a.op.as_str(), op);
        }
    }

    #[test]
    fn evaluates_against_summary() {
        let s = summary();
        assert!(Assertion::parse("p99 < 500ms").unwrap().evaluate(&s).passed);
        assert!(Assertion::parse("rps >= 20").unwrap().evaluate(&s).passed);
        assert!(!Assertion::parse("error_rate < 1%").unwrap().evaluate(&s).passed);
        assert!(Assertion::parse("errors <= 2").unwrap().evaluate(&s).passed);
        assert!(Assertion::parse("requests == 200").unwrap().evaluate(&s).passed);
    }

    #[test]
    fn unknown_metric_fails_with_nan() {
        let res = Assertion::parse("warp_factor < 9").unwrap().evaluate(&summary());
        assert!(res.actual.is_nan());
        assert!(!res.passed);
    }
}
