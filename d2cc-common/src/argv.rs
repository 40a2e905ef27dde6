//! Compiler argv classification and rewriting.
//!
//! A single left-to-right traversal ([`Tokens`]) backs three views of the same
//! command line:
//!
//! - [`classify`] decides whether the invocation can be built remotely.
//! - [`remote_args`] lazily yields the argv sent to the daemon, with the input
//!   and output files replaced by placeholders and dependency options removed.
//! - [`preprocess_args`] builds the owned argv for the local preprocessor run.
//!
//! Classification is total: any argv, including an empty one, produces a
//! result without panicking.

use crate::protocol::{ARGV_INPUT_PLACEHOLDER, ARGV_OUTPUT_PLACEHOLDER};
use crate::util::basename;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Options whose value is always the following argument.
const SPLIT_VALUE_OPTIONS: &[&str] = &[
    "-I",
    "-D",
    "-U",
    "-include",
    "-imacros",
    "-isystem",
    "-iquote",
    "-idirafter",
    "-iprefix",
    "-isysroot",
    "-x",
    "-Xpreprocessor",
    "-L",
    "-l",
];

/// Dependency options that take a separate value.
const SPLIT_DEPENDENCY_OPTIONS: &[&str] = &["-MT", "-MF", "-MQ"];

/// Why an invocation cannot go remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    EmptyArgv,
    /// Input read from stdin (`-`).
    StdinInput,
    /// Positional argument without a file-name suffix.
    NoSuffix(OsString),
    /// Positional argument is an object file.
    ObjectInput(OsString),
    MultipleInputs,
    NoInput,
    /// Option needing a value was the last argument.
    MissingValue(OsString),
    /// No `-c`, so the compiler would link.
    LinkStage,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyArgv => write!(f, "empty argv"),
            Self::StdinInput => write!(f, "input from stdin"),
            Self::NoSuffix(arg) => write!(f, "input {:?} has no suffix", arg),
            Self::ObjectInput(arg) => write!(f, "input {:?} is an object file", arg),
            Self::MultipleInputs => write!(f, "multiple input files"),
            Self::NoInput => write!(f, "no input file"),
            Self::MissingValue(opt) => write!(f, "option {:?} is missing its value", opt),
            Self::LinkStage => write!(f, "link step (no -c)"),
        }
    }
}

/// Result of scanning a compiler argv.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedInvocation {
    pub is_remotable: bool,
    /// `-c` was seen before the scan stopped.
    pub object_only: bool,
    pub input_path: Option<OsString>,
    pub output_path: Option<OsString>,
    pub compiler_basename: OsString,
    /// First condition that halted the scan, if any.
    pub reject: Option<RejectReason>,
}

impl ClassifiedInvocation {
    /// Apply the wrapper's remote policy on top of classification.
    pub fn admits(&self, require_object_only: bool) -> Result<(), RejectReason> {
        if let Some(reason) = &self.reject {
            return Err(reason.clone());
        }
        if require_object_only && !self.object_only {
            return Err(RejectReason::LinkStage);
        }
        Ok(())
    }
}

/// One step of the argv traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Program(&'a OsStr),
    CompileOnly,
    /// `-o FILE` or `-oFILE`.
    Output {
        file: &'a OsStr,
    },
    /// Any `-M*` option, with its value when split.
    Dependency {
        flag: &'a OsStr,
        value: Option<&'a OsStr>,
    },
    SplitValue {
        flag: &'a OsStr,
        value: &'a OsStr,
    },
    Other(&'a OsStr),
    Input(&'a OsStr),
    MissingValue(&'a OsStr),
}

impl<'a> Token<'a> {
    fn remote_form(self) -> [Option<&'a OsStr>; 2] {
        match self {
            Token::Program(arg0) => [Some(basename(arg0)), None],
            Token::CompileOnly => [Some(OsStr::new("-c")), None],
            Token::Output { .. } => [
                Some(OsStr::new("-o")),
                Some(OsStr::new(ARGV_OUTPUT_PLACEHOLDER)),
            ],
            Token::Dependency { .. } => [None, None],
            Token::SplitValue { flag, value } => [Some(flag), Some(value)],
            Token::Other(arg) | Token::MissingValue(arg) => [Some(arg), None],
            Token::Input(_) => [Some(OsStr::new(ARGV_INPUT_PLACEHOLDER)), None],
        }
    }

    /// Dependency options are dropped: with `-o -` gcc would name the `-MD`
    /// file `-.d`, and `-MF` would clobber the user's file. The local compile
    /// still writes dependencies.
    fn preprocess_form(self) -> [Option<&'a OsStr>; 2] {
        match self {
            Token::Program(arg0) => [Some(arg0), None],
            Token::CompileOnly => [Some(OsStr::new("-E")), None],
            Token::Output { .. } => [Some(OsStr::new("-o")), Some(OsStr::new("-"))],
            Token::Dependency { .. } => [None, None],
            Token::SplitValue { flag, value } => [Some(flag), Some(value)],
            Token::Other(arg) | Token::MissingValue(arg) | Token::Input(arg) => [Some(arg), None],
        }
    }
}

/// Left-to-right traversal of an argv, consuming split option values.
#[derive(Debug, Clone)]
struct Tokens<'a> {
    args: &'a [OsString],
    pos: usize,
}

impl<'a> Tokens<'a> {
    fn new(args: &'a [OsString]) -> Self {
        Self { args, pos: 0 }
    }

    fn take_value(&mut self) -> Option<&'a OsStr> {
        let value = self.args.get(self.pos)?;
        self.pos += 1;
        Some(value.as_os_str())
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        let arg = self.args.get(self.pos)?.as_os_str();
        self.pos += 1;
        if self.pos == 1 {
            return Some(Token::Program(arg));
        }

        let bytes = arg.as_bytes();
        if bytes.len() < 2 || bytes[0] != b'-' {
            return Some(Token::Input(arg));
        }

        let token = if bytes == b"-c" {
            Token::CompileOnly
        } else if bytes[1] == b'o' {
            if bytes.len() > 2 {
                Token::Output {
                    file: OsStr::from_bytes(&bytes[2..]),
                }
            } else {
                match self.take_value() {
                    Some(file) => Token::Output { file },
                    None => Token::MissingValue(arg),
                }
            }
        } else if bytes[1] == b'M' {
            if SPLIT_DEPENDENCY_OPTIONS.iter().any(|o| o.as_bytes() == bytes) {
                match self.take_value() {
                    Some(value) => Token::Dependency {
                        flag: arg,
                        value: Some(value),
                    },
                    None => Token::MissingValue(arg),
                }
            } else {
                Token::Dependency {
                    flag: arg,
                    value: None,
                }
            }
        } else if SPLIT_VALUE_OPTIONS.iter().any(|o| o.as_bytes() == bytes) {
            match self.take_value() {
                Some(value) => Token::SplitValue { flag: arg, value },
                None => Token::MissingValue(arg),
            }
        } else {
            Token::Other(arg)
        };
        Some(token)
    }
}

fn check_input(arg: &OsStr) -> Result<(), RejectReason> {
    if arg.as_bytes() == b"-" {
        return Err(RejectReason::StdinInput);
    }
    // Stricter than "text after the last dot": gcc hands a file without a
    // recognized source suffix to the linker, so `dir.d/foo`, `foo.` and the
    // dotfile `src/.c` stay local.
    match Path::new(arg).extension() {
        None => Err(RejectReason::NoSuffix(arg.to_os_string())),
        Some(ext) if ext.is_empty() => Err(RejectReason::NoSuffix(arg.to_os_string())),
        Some(ext) if ext == "o" => Err(RejectReason::ObjectInput(arg.to_os_string())),
        Some(_) => Ok(()),
    }
}

/// Classify a full compiler argv (argv[0] included).
pub fn classify(args: &[OsString]) -> ClassifiedInvocation {
    let mut result = ClassifiedInvocation {
        is_remotable: false,
        object_only: false,
        input_path: None,
        output_path: None,
        compiler_basename: args
            .first()
            .map(|arg0| basename(arg0).to_os_string())
            .unwrap_or_default(),
        reject: None,
    };
    if args.is_empty() {
        result.reject = Some(RejectReason::EmptyArgv);
        return result;
    }

    for token in Tokens::new(args) {
        let halt = match token {
            Token::CompileOnly => {
                result.object_only = true;
                None
            }
            Token::Output { file } => {
                result.output_path = Some(file.to_os_string());
                None
            }
            Token::MissingValue(flag) => Some(RejectReason::MissingValue(flag.to_os_string())),
            Token::Input(arg) => match check_input(arg) {
                Err(reason) => Some(reason),
                Ok(()) if result.input_path.is_some() => Some(RejectReason::MultipleInputs),
                Ok(()) => {
                    result.input_path = Some(arg.to_os_string());
                    None
                }
            },
            Token::Program(_)
            | Token::Dependency { .. }
            | Token::SplitValue { .. }
            | Token::Other(_) => None,
        };
        if halt.is_some() {
            result.reject = halt;
            return result;
        }
    }

    if result.input_path.is_none() {
        result.reject = Some(RejectReason::NoInput);
    } else {
        result.is_remotable = true;
    }
    result
}

/// Lazily produce the argv sent to the daemon.
///
/// Only meaningful for an argv that [`classify`] accepted.
pub fn remote_args(args: &[OsString]) -> impl Iterator<Item = &OsStr> + '_ {
    Tokens::new(args).flat_map(|t| t.remote_form().into_iter().flatten())
}

/// Owned argv for running the local preprocessor.
///
/// `-c` becomes `-E` (appended when absent) and output goes to stdout.
pub fn preprocess_args(args: &[OsString]) -> Vec<OsString> {
    let mut saw_compile_only = false;
    let mut out: Vec<OsString> = Tokens::new(args)
        .inspect(|t| saw_compile_only |= *t == Token::CompileOnly)
        .flat_map(|t| t.preprocess_form().into_iter().flatten())
        .map(OsStr::to_os_string)
        .collect();
    if !saw_compile_only && !out.is_empty() {
        out.push(OsString::from("-E"));
    }
    out
}
