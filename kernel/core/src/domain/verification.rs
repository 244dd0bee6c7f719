// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Verification Result Domain Model
//!
//! Aggregated outcome of the verifier role: schema validation, post-condition
//! checks, and invariant checks. A single critical failure marks the whole
//! verification failed; a mix of pass and fail marks it partial.

use serde::{Deserialize, Serialize};

use crate::domain::tool::{IssueSeverity, ValidationIssue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Passed,
    Partial,
    Failed,
}

/// One named check's outcome (post-condition or invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub severity: IssueSeverity,
    pub detail: Option<String>,
}

/// Verifier output for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub schema_issues: Vec<ValidationIssue>,
    pub post_conditions: Vec<CheckResult>,
    pub invariants: Vec<CheckResult>,
    pub status: VerificationStatus,
    /// True only when schema, post-conditions, and invariants all passed.
    pub overall_passed: bool,
}

impl VerificationReport {
    pub fn from_parts(
        schema_issues: Vec<ValidationIssue>,
        post_conditions: Vec<CheckResult>,
        invariants: Vec<CheckResult>,
    ) -> Self {
        let schema_critical = schema_issues
            .iter()
            .any(|i| i.severity == IssueSeverity::Critical);
        let schema_passed = schema_issues.is_empty();

        let any_check_failed = post_conditions
            .iter()
            .chain(invariants.iter())
            .any(|c| !c.passed);
        let any_critical_check_failed = post_conditions
            .iter()
            .chain(invariants.iter())
            .any(|c| !c.passed && c.severity == IssueSeverity::Critical);
        let any_check_passed = post_conditions
            .iter()
            .chain(invariants.iter())
            .any(|c| c.passed);

        let overall_passed = schema_passed && !any_check_failed;

        let status = if schema_critical || any_critical_check_failed {
            VerificationStatus::Failed
        } else if any_check_failed || !schema_passed {
            // Warnings only: partial when anything passed alongside, failed
            // when nothing did.
            if any_check_passed || schema_passed {
                VerificationStatus::Partial
            } else {
                VerificationStatus::Failed
            }
        } else {
            VerificationStatus::Passed
        };

        Self {
            schema_issues,
            post_conditions,
            invariants,
            status,
            overall_passed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(name: &str, passed: bool, severity: IssueSeverity) -> CheckResult {
        CheckResult {
            name: name.to_string(),
            passed,
            severity,
            detail: None,
        }
    }

    #[test]
    fn all_clear_passes() {
        let report = VerificationReport::from_parts(
            vec![],
            vec![check("pc", true, IssueSeverity::Critical)],
            vec![check("inv", true, IssueSeverity::Critical)],
        );
        assert!(report.overall_passed);
        assert_eq!(report.status, VerificationStatus::Passed);
    }

    #[test]
    fn single_critical_failure_fails_whole_verification() {
        let report = VerificationReport::from_parts(
            vec![],
            vec![
                check("ok", true, IssueSeverity::Critical),
                check("bad", false, IssueSeverity::Critical),
            ],
            vec![],
        );
        assert!(!report.overall_passed);
        assert_eq!(report.status, VerificationStatus::Failed);
    }

    #[test]
    fn warning_mix_is_partial() {
        let report = VerificationReport::from_parts(
            vec![],
            vec![check("ok", true, IssueSeverity::Critical)],
            vec![check("slow", false, IssueSeverity::Warning)],
        );
        assert!(!report.overall_passed);
        assert_eq!(report.status, VerificationStatus::Partial);
    }

    #[test]
    fn schema_issue_blocks_overall_pass() {
        let report = VerificationReport::from_parts(
            vec![ValidationIssue {
                field: "path".to_string(),
                code: "missing_required".to_string(),
                message: "required parameter 'path' missing".to_string(),
                severity: IssueSeverity::Critical,
            }],
            vec![],
            vec![],
        );
        assert!(!report.overall_passed);
        assert_eq!(report.status, VerificationStatus::Failed);
    }
}
