//! Consistency checks over candidate lists and the registry.
//!
//! Every violation is collected; nothing stops at the first one.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::compare_names;
use crate::error::{Result, VigieError};
use crate::registry::DomainSet;
use crate::sources::{parse_line, split_line};
use crate::validation::is_valid_domain;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LintIssue {
    /// `line` sorts before the line above it
    Unsorted { file: PathBuf, line: usize },
    InvalidDomain {
        file: PathBuf,
        line: usize,
        text: String,
    },
    NotLowercase {
        file: PathBuf,
        line: usize,
        text: String,
    },
    Duplicate {
        file: PathBuf,
        line: usize,
        name: String,
        first_file: PathBuf,
        first_line: usize,
    },
    /// Registry entry listed in no candidate file
    Orphan { name: String },
}

impl fmt::Display for LintIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LintIssue::Unsorted { file, line } => write!(
                f,
                "{}:{}: Is not sorted, run `vigie sort` on candidate lists",
                file.display(),
                line
            ),
            LintIssue::InvalidDomain { file, line, text } => write!(
                f,
                "{}:{}: {:?} does not look like a domain name",
                file.display(),
                line,
                text
            ),
            LintIssue::NotLowercase { file, line, text } => {
                write!(f, "{}:{}: {:?} is not lowercased", file.display(), line, text)
            }
            LintIssue::Duplicate {
                file,
                line,
                name,
                first_file,
                first_line,
            } => write!(
                f,
                "{}:{}: Duplicate domain {:?} (already seen in {}:{})",
                file.display(),
                line,
                name,
                first_file.display(),
                first_line
            ),
            LintIssue::Orphan { name } => {
                write!(f, "{}: not found in any candidate list", name)
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LintReport {
    pub files: usize,
    pub names: usize,
    pub issues: Vec<LintIssue>,
}

impl LintReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Accumulates issues file after file.
#[derive(Debug, Default)]
pub struct Linter {
    seen: HashMap<String, (PathBuf, usize)>,
    report: LintReport,
}

impl Linter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_content(&mut self, file: &Path, content: &str) {
        self.report.files += 1;
        let mut previous: Option<String> = None;

        for (index, line) in content.lines().enumerate() {
            let lineno = index + 1;
            let Some((host, _)) = split_line(line) else {
                continue;
            };

            if host != host.to_lowercase() {
                self.report.issues.push(LintIssue::NotLowercase {
                    file: file.to_path_buf(),
                    line: lineno,
                    text: host.to_string(),
                });
            }

            let Some(domain) = parse_line(line, Some(file)).filter(|d| is_valid_domain(&d.name))
            else {
                self.report.issues.push(LintIssue::InvalidDomain {
                    file: file.to_path_buf(),
                    line: lineno,
                    text: host.to_string(),
                });
                continue;
            };

            if let Some(previous) = &previous {
                if compare_names(&domain.name, previous) == Ordering::Less {
                    self.report.issues.push(LintIssue::Unsorted {
                        file: file.to_path_buf(),
                        line: lineno,
                    });
                }
            }

            match self.seen.get(&domain.name) {
                Some((first_file, first_line)) => {
                    self.report.issues.push(LintIssue::Duplicate {
                        file: file.to_path_buf(),
                        line: lineno,
                        name: domain.name.clone(),
                        first_file: first_file.clone(),
                        first_line: *first_line,
                    });
                }
                None => {
                    self.seen
                        .insert(domain.name.clone(), (file.to_path_buf(), lineno));
                }
            }
            previous = Some(domain.name);
        }
    }

    pub fn check_file(&mut self, file: &Path) -> Result<()> {
        let content = std::fs::read_to_string(file).map_err(|e| VigieError::file(file, e))?;
        self.check_content(file, &content);
        Ok(())
    }

    /// Every registry name must come from some checked candidate file.
    pub fn check_registry(&mut self, domains: &DomainSet) {
        for domain in domains {
            if !self.seen.contains_key(&domain.name) {
                self.report.issues.push(LintIssue::Orphan {
                    name: domain.name.clone(),
                });
            }
        }
    }

    pub fn finish(mut self) -> LintReport {
        self.report.names = self.seen.len();
        self.report
    }
}

/// Lints candidate files, then the registry against them.
pub fn lint_files(files: &[PathBuf], registry: Option<&DomainSet>) -> Result<LintReport> {
    let mut linter = Linter::new();
    for file in files {
        linter.check_file(file)?;
    }
    if let Some(domains) = registry {
        linter.check_registry(domains);
    }
    Ok(linter.finish())
}
