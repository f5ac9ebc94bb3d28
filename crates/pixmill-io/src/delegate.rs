//! External programs invoked for formats pixmill does not code itself.
//!
//! A delegate is a named command template. Before running, the template is
//! split into arguments (single and double quotes group words) and each
//! argument has its escapes expanded:
//!
//! | Escape | Expands to |
//! |--------|------------|
//! | `%i` | input path |
//! | `%o` | output path |
//! | `%u` | unique scratch base name |
//! | `%%` | literal `%` |
//!
//! No shell is involved; a template that needs one must name it.

use std::collections::BTreeMap;
use std::process::Command;
use std::sync::RwLock;

use tracing::{debug, warn};

use crate::error::{IoError, IoResult};

/// Default MPEG decode command; writes `<unique><n>.ppm` frames.
pub const MPEG_DECODE: &str = "mpeg-decode";

/// Default MPEG encode command; reads a parameter file.
pub const MPEG_ENCODE: &str = "mpeg-encode";

lazy_static::lazy_static! {
    static ref GLOBAL: DelegateTable = DelegateTable::with_defaults();
}

/// Paths substituted into a command template.
#[derive(Debug, Clone, Default)]
pub struct DelegateArgs<'a> {
    /// Expansion of `%i`.
    pub input: &'a str,
    /// Expansion of `%o`.
    pub output: &'a str,
    /// Expansion of `%u`.
    pub unique: &'a str,
}

/// Named command templates.
#[derive(Debug, Default)]
pub struct DelegateTable {
    commands: RwLock<BTreeMap<String, String>>,
}

impl DelegateTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table holding the MPEG decode and encode commands.
    pub fn with_defaults() -> Self {
        let table = Self::new();
        table.set(MPEG_DECODE, "mpeg2decode -q -b \"%i\" -f -o3 \"%u%%d\"");
        table.set(MPEG_ENCODE, "mpeg2encode \"%i\" \"%o\"");
        table
    }

    /// The process-wide table.
    pub fn global() -> &'static DelegateTable {
        &GLOBAL
    }

    /// Sets or replaces the template for `name`.
    pub fn set(&self, name: &str, template: &str) {
        if let Ok(mut commands) = self.commands.write() {
            commands.insert(name.to_string(), template.to_string());
        }
    }

    /// Removes `name`, returning its template.
    pub fn remove(&self, name: &str) -> Option<String> {
        self.commands.write().ok()?.remove(name)
    }

    /// Template registered under `name`.
    pub fn get(&self, name: &str) -> Option<String> {
        self.commands.read().ok()?.get(name).cloned()
    }

    /// Expands and runs `name`, waiting for it to exit.
    pub fn invoke(&self, name: &str, args: &DelegateArgs<'_>) -> IoResult<()> {
        let template = self.get(name).ok_or_else(|| IoError::Delegate {
            name: name.to_string(),
            exit_code: None,
            command: String::new(),
        })?;
        let argv: Vec<String> = split_command(&template)
            .iter()
            .map(|word| expand(word, args))
            .collect();
        let command_line = argv.join(" ");
        let Some((program, rest)) = argv.split_first() else {
            return Err(IoError::Delegate {
                name: name.to_string(),
                exit_code: None,
                command: command_line,
            });
        };
        debug!(delegate = name, command = %command_line, "invoking delegate");
        let status = Command::new(program).args(rest).status().map_err(|err| {
            warn!(delegate = name, error = %err, "delegate failed to start");
            IoError::Delegate {
                name: name.to_string(),
                exit_code: None,
                command: command_line.clone(),
            }
        })?;
        if !status.success() {
            return Err(IoError::Delegate {
                name: name.to_string(),
                exit_code: status.code(),
                command: command_line,
            });
        }
        Ok(())
    }
}

// === Template handling ===

/// Splits a command line into words. Quotes group words and are removed.
pub fn split_command(template: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut quote: Option<char> = None;
    let mut in_word = false;
    for c in template.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => word.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut word));
                    in_word = false;
                }
            }
            (None, c) => {
                word.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(word);
    }
    words
}

/// Expands `%i`, `%o`, `%u` and `%%` in one word. Unknown escapes are kept.
pub fn expand(word: &str, args: &DelegateArgs<'_>) -> String {
    let mut out = String::with_capacity(word.len());
    let mut chars = word.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('i') => out.push_str(args.input),
            Some('o') => out.push_str(args.output),
            Some('u') => out.push_str(args.unique),
            Some('%') => out.push('%'),
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    out
}
