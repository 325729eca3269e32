//! Bug pattern detectors and the driver running them over classes
//!
//! Each detector is an [`analysis::Detector`] that also collects [`Finding`]s. The driver
//! ([`scan_class`]) simulates every method of a class once per enabled detector, and forwards
//! findings and problems to a [`BugReporter`]. Failures are contained to the method they happen
//! in: the method is reported as incomplete and the scan moves on.
//!
//! [`analysis::Detector`]: crate::analysis::Detector

mod character_parameter;
mod errors;
#[cfg(test)]
mod fixtures;
mod inappropriate_to_string;
mod non_owned_sync;

pub use character_parameter::*;
pub use errors::*;
pub use inappropriate_to_string::*;
pub use non_owned_sync::*;

use crate::analysis::{Detector, Diagnostic, MethodContext, SimulationError, Simulator};
use crate::jvm::class_file::ClassFile;
use crate::jvm::code::Code;
use crate::jvm::{BinaryName, MethodDescriptor, RenderDescriptor, UnqualifiedName};
use crate::settings::Settings;
use crate::util::Offset;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::str::FromStr;

/// How confident a detector is in a finding
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Priority {
    High = 1,
    Normal = 2,
    Low = 3,
}

impl Display for Priority {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        })
    }
}

/// Kind of bug pattern found
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BugKind {
    InappropriateToStringUse,
    NonOwnedSynchronization,
    UseCharacterParameterizedMethod,
}

impl BugKind {
    pub fn name(&self) -> &'static str {
        match self {
            BugKind::InappropriateToStringUse => "ITU_INAPPROPRIATE_TOSTRING_USE",
            BugKind::NonOwnedSynchronization => "NOS_NON_OWNED_SYNCHRONIZATION",
            BugKind::UseCharacterParameterizedMethod => "UCPM_USE_CHARACTER_PARAMETERIZED_METHOD",
        }
    }
}

impl Display for BugKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Occurrence of a bug pattern
#[derive(Clone, PartialEq, Debug)]
pub struct Finding {
    pub kind: BugKind,
    pub priority: Priority,
    pub class: BinaryName,
    pub method: UnqualifiedName,
    pub descriptor: MethodDescriptor,
    pub offset: Offset,
    pub line: Option<u16>,
}

impl Finding {
    /// Finding at an instruction of the method being simulated
    pub fn at(
        kind: BugKind,
        priority: Priority,
        method: &MethodContext,
        offset: Offset,
    ) -> Finding {
        Finding {
            kind,
            priority,
            class: method.class.clone(),
            method: method.name.clone(),
            descriptor: method.descriptor.clone(),
            offset,
            line: method.code.line_number(offset),
        }
    }
}

impl Display for Finding {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} in {}.{}{} {}",
            self.kind,
            self.class,
            self.method,
            self.descriptor.render(),
            self.offset
        )?;
        if let Some(line) = self.line {
            write!(f, " (line {})", line)?;
        }
        Ok(())
    }
}

/// Sink for the results of a scan
pub trait BugReporter {
    fn report(&mut self, finding: Finding);

    /// A method could not be analysed to the end
    fn report_incomplete(&mut self, class: &BinaryName, method: &str, error: &SimulationError);

    /// A method was analysed, but with some information missing
    fn report_missing(&mut self, class: &BinaryName, method: &str, diagnostic: &Diagnostic);
}

/// Reporter that just keeps everything
#[derive(Debug, Default)]
pub struct CollectingReporter {
    pub findings: Vec<Finding>,
    pub incomplete: Vec<(String, SimulationError)>,
    pub missing: Vec<(String, Diagnostic)>,
}

impl BugReporter for CollectingReporter {
    fn report(&mut self, finding: Finding) {
        self.findings.push(finding);
    }

    fn report_incomplete(&mut self, class: &BinaryName, method: &str, error: &SimulationError) {
        self.incomplete
            .push((format!("{}.{}", class, method), error.clone()));
    }

    fn report_missing(&mut self, class: &BinaryName, method: &str, diagnostic: &Diagnostic) {
        self.missing
            .push((format!("{}.{}", class, method), diagnostic.clone()));
    }
}

/// Detector that produces findings
pub trait BugDetector: Detector {
    /// Findings accumulated since the last call
    fn take_findings(&mut self) -> Vec<Finding>;
}

/// Detectors that can be enabled
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum DetectorKind {
    InappropriateToStringUse,
    NonOwnedSynchronization,
    UseCharacterParameterizedMethod,
}

impl DetectorKind {
    pub const ALL: [DetectorKind; 3] = [
        DetectorKind::InappropriateToStringUse,
        DetectorKind::NonOwnedSynchronization,
        DetectorKind::UseCharacterParameterizedMethod,
    ];

    /// Short name used on the command line
    pub fn abbreviation(&self) -> &'static str {
        match self {
            DetectorKind::InappropriateToStringUse => "ITU",
            DetectorKind::NonOwnedSynchronization => "NOS",
            DetectorKind::UseCharacterParameterizedMethod => "UCPM",
        }
    }
}

impl FromStr for DetectorKind {
    type Err = String;

    fn from_str(name: &str) -> Result<DetectorKind, String> {
        DetectorKind::ALL
            .iter()
            .find(|kind| kind.abbreviation().eq_ignore_ascii_case(name))
            .copied()
            .ok_or_else(|| format!("Unknown detector '{}' (expected ITU, NOS, or UCPM)", name))
    }
}

impl Display for DetectorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.abbreviation())
    }
}

/// Read a class file and scan it
pub fn scan_file<P: AsRef<Path>>(
    path: P,
    settings: &Settings,
    reporter: &mut dyn BugReporter,
) -> Result<(), Error> {
    let path = path.as_ref();
    log::info!("Reading '{}'", path.display());
    let bytes = std::fs::read(path)?;
    let class = ClassFile::parse(&bytes)?;
    scan_class(&class, settings, reporter);
    Ok(())
}

/// Run the enabled detectors over every method of a class
pub fn scan_class(class: &ClassFile, settings: &Settings, reporter: &mut dyn BugReporter) {
    for method in &class.methods {
        let signature = method.signature();
        let code: Code = match method.decode_code() {
            None => continue,
            Some(Ok(code)) => code,
            Some(Err(err)) => {
                log::warn!("Cannot decode {}.{}: {}", class.this_class, signature, err);
                reporter.report_incomplete(&class.this_class, &signature, &err.into());
                continue;
            }
        };
        let context = MethodContext {
            class: &class.this_class,
            name: &method.name,
            descriptor: &method.descriptor,
            access_flags: method.access_flags,
            code: &code,
        };

        for kind in &settings.detectors {
            let scan = MethodScan {
                class,
                settings,
                method: &context,
                signature: &signature,
            };
            match kind {
                DetectorKind::InappropriateToStringUse => scan.run(
                    &mut InappropriateToStringUse::new(&class.this_class, settings),
                    reporter,
                ),
                DetectorKind::NonOwnedSynchronization => {
                    scan.run(&mut NonOwnedSynchronization::new(settings), reporter)
                }
                DetectorKind::UseCharacterParameterizedMethod => {
                    scan.run(&mut UseCharacterParameterizedMethod::new(settings), reporter)
                }
            }
        }
    }
}

/// One detector over one method
struct MethodScan<'a> {
    class: &'a ClassFile,
    settings: &'a Settings,
    method: &'a MethodContext<'a>,
    signature: &'a str,
}

impl<'a> MethodScan<'a> {
    fn run<D: BugDetector>(&self, detector: &mut D, reporter: &mut dyn BugReporter) {
        let mut simulator: Simulator<D::Tag> = Simulator::new(&self.class.constants)
            .with_instruction_limit(self.settings.max_instructions_per_method)
            .with_ternary_normalization(self.settings.ternary_normalization);

        let outcome = simulator.run(self.method, detector);
        for diagnostic in simulator.take_diagnostics() {
            reporter.report_missing(self.method.class, self.signature, &diagnostic);
        }
        for finding in detector.take_findings() {
            reporter.report(finding);
        }
        if let Err(err) = outcome {
            log::warn!(
                "Incomplete analysis of {}.{}: {}",
                self.method.class,
                self.signature,
                err
            );
            reporter.report_incomplete(self.method.class, self.signature, &err);
        }
    }
}
