use opstack::analysis::{Diagnostic, SimulationError};
use opstack::detect::{self, BugReporter, DetectorKind, Finding, Priority};
use opstack::jvm::{BinaryName, RenderDescriptor};
use opstack::settings::Settings;

use clap::{value_parser, Arg, ArgAction, Command};
use std::io::Write;
use std::path::PathBuf;
use std::process::exit;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use walkdir::WalkDir;

/// Prints findings as they come in
struct TerminalReporter {
    stdout: StandardStream,
    findings: usize,
    incomplete: usize,
}

impl TerminalReporter {
    fn print_finding(&mut self, finding: &Finding) -> std::io::Result<()> {
        let color = match finding.priority {
            Priority::High => Color::Red,
            Priority::Normal => Color::Yellow,
            Priority::Low => Color::Cyan,
        };
        let mut s = self.stdout.lock();
        s.write_all(b" - ")?;
        s.set_color(ColorSpec::new().set_bold(true))?;
        write!(s, "{}", finding.kind)?;
        s.set_color(ColorSpec::new().set_dimmed(true))?;
        s.write_all(b" [")?;
        s.set_color(ColorSpec::new().set_fg(Some(color)))?;
        write!(s, "{}", finding.priority)?;
        s.set_color(ColorSpec::new().set_dimmed(true))?;
        s.write_all(b"] ")?;
        s.reset()?;
        write!(
            s,
            "{}.{}{} {}",
            finding.class,
            finding.method,
            finding.descriptor.render(),
            finding.offset
        )?;
        if let Some(line) = finding.line {
            write!(s, " (line {})", line)?;
        }
        s.write_all(b"\n")?;
        Ok(())
    }

    fn print_incomplete(
        &mut self,
        class: &BinaryName,
        method: &str,
        error: &SimulationError,
    ) -> std::io::Result<()> {
        let mut s = self.stdout.lock();
        s.write_all(b" - ")?;
        s.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)))?;
        s.write_all(b"INCOMPLETE")?;
        s.set_color(ColorSpec::new().set_dimmed(true))?;
        writeln!(s, " {}.{}: {}", class, method, error)?;
        s.reset()?;
        Ok(())
    }
}

impl BugReporter for TerminalReporter {
    fn report(&mut self, finding: Finding) {
        self.findings += 1;
        if let Err(err) = self.print_finding(&finding) {
            log::error!("Failed to print {}: {}", finding, err);
        }
    }

    fn report_incomplete(&mut self, class: &BinaryName, method: &str, error: &SimulationError) {
        self.incomplete += 1;
        if let Err(err) = self.print_incomplete(class, method, error) {
            log::error!("Failed to print incomplete method {}.{}: {}", class, method, err);
        }
    }

    fn report_missing(&mut self, class: &BinaryName, method: &str, diagnostic: &Diagnostic) {
        log::info!("{}.{}: {}", class, method, diagnostic);
    }
}

fn main() -> Result<(), detect::Error> {
    env_logger::init();

    let matches = Command::new("JVM bytecode bug pattern detector")
        .version("0.1.0")
        .author("Alec Theriault <alec.theriault@gmail.com>")
        .about("Look for bug patterns in class files by simulating their operand stacks")
        .arg(
            Arg::new("detector")
                .long("detector")
                .short('d')
                .value_name("NAME")
                .action(ArgAction::Append)
                .value_parser(value_parser!(DetectorKind))
                .help("Only run this detector (one of ITU, NOS, UCPM), may be repeated"),
        )
        .arg(
            Arg::new("max instructions")
                .long("max-instructions")
                .value_name("COUNT")
                .value_parser(value_parser!(usize))
                .help("Skip (and report as incomplete) methods longer than this"),
        )
        .arg(
            Arg::new("package depth")
                .long("package-depth")
                .value_name("DEPTH")
                .value_parser(value_parser!(usize))
                .default_value("2")
                .help("Package segments shared by classes considered related"),
        )
        .arg(
            Arg::new("no call chains")
                .long("no-call-chains")
                .action(ArgAction::SetTrue)
                .help("Don't carry a receiver's tag over to the value returned by calls on it"),
        )
        .arg(
            Arg::new("no ternary merge")
                .long("no-ternary-merge")
                .action(ArgAction::SetTrue)
                .help("Don't merge the state of paths joining after forward branches"),
        )
        .arg(
            Arg::new("INPUT")
                .help("Class files or folders containing class files")
                .required(true)
                .num_args(1..)
                .value_parser(value_parser!(PathBuf)),
        )
        .get_matches();

    let mut settings = match matches.get_many::<DetectorKind>("detector") {
        Some(detectors) => Settings::with_detectors(detectors.copied().collect()),
        None => Settings::default(),
    };
    settings.max_instructions_per_method = matches.get_one::<usize>("max instructions").copied();
    if let Some(depth) = matches.get_one::<usize>("package depth") {
        settings.similar_package_depth = *depth;
    }
    settings.propagate_call_chains = !matches.get_flag("no call chains");
    settings.ternary_normalization = !matches.get_flag("no ternary merge");

    // Find all of the class files
    let mut classes: Vec<PathBuf> = vec![];
    for input_path in matches.get_many::<PathBuf>("INPUT").into_iter().flatten() {
        if input_path.is_file() {
            classes.push(input_path.clone());
        } else {
            classes.extend(
                WalkDir::new(input_path)
                    .follow_links(true)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .map(|e| e.into_path())
                    .filter(|e| e.is_file() && e.extension().map_or(false, |ex| ex == "class")),
            );
        }
    }
    log::info!("Scanning {} class files", classes.len());

    let mut reporter = TerminalReporter {
        stdout: StandardStream::stdout(ColorChoice::Auto),
        findings: 0,
        incomplete: 0,
    };
    let mut count_error = 0;
    for class in &classes {
        if let Err(err) = detect::scan_file(class, &settings, &mut reporter) {
            count_error += 1;
            log::error!("Failed to scan '{}': {}", class.display(), err);
        }
    }

    log::info!(
        "{} findings, {} incomplete methods, {} unreadable files",
        reporter.findings,
        reporter.incomplete,
        count_error
    );

    // Exit code
    exit(if reporter.findings > 0 || count_error > 0 {
        1
    } else {
        0
    })
}
