//! mocksql is an interactive shell for a mock database. It creates an empty
//! in-memory database for the configured dialect and version, and executes SQL
//! statements against it, accepting or rejecting syntax the way that dialect
//! version would. Command history is stored in .mocksql.history.

#![warn(clippy::all)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser as _;
use itertools::Itertools as _;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Editor, Modifiers};
use rustyline_derive::{Completer, Helper, Highlighter, Hinter};

use sqlmock::client::{Connection, Database};
use sqlmock::config::Settings;
use sqlmock::errinvalid;
use sqlmock::error::Result;
use sqlmock::sql::dialect::{Dialect, DialectVersion};
use sqlmock::sql::execution::{ExecutionResult, Registry};
use sqlmock::sql::parser::{Lexer, Token};

fn main() {
    if let Err(error) = Command::parse().run() {
        eprintln!("Error: {error}");
    }
}

/// The mocksql command.
#[derive(clap::Parser)]
#[command(about = "An interactive shell for a mock SQL database.", version, propagate_version = true)]
struct Command {
    /// A SQL statement to execute, then exit.
    #[arg()]
    statement: Option<String>,
    /// The dialect to emulate, overriding the configuration.
    #[arg(short = 'd', long)]
    dialect: Option<String>,
    /// The dialect version to emulate, overriding the configuration.
    #[arg(short = 'r', long)]
    dialect_version: Option<u32>,
    /// Configuration file path.
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,
}

impl Command {
    /// Runs the command.
    fn run(self) -> Result<()> {
        let mut settings = Settings::load(self.config.as_deref())?;
        if let Some(dialect) = self.dialect {
            settings.dialect = dialect;
            settings.version = None;
        }
        if let Some(version) = self.dialect_version {
            settings.version = Some(version);
        }

        let loglevel = settings.log_level.parse::<simplelog::LevelFilter>()?;
        let mut logconfig = simplelog::ConfigBuilder::new();
        if loglevel != simplelog::LevelFilter::Trace {
            logconfig.add_filter_allow_str("sqlmock");
        }
        simplelog::SimpleLogger::init(loglevel, logconfig.build())?;

        let mut shell = Shell::new(Database::from_settings(&settings)?)?;
        match self.statement {
            Some(statement) => shell.execute(&statement),
            None => shell.run(),
        }
    }
}

/// An interactive mocksql shell.
struct Shell {
    /// The mock database.
    database: Database,
    /// The open connection statements are executed on.
    connection: Connection,
    /// The Rustyline command editor.
    editor: Editor<InputValidator, DefaultHistory>,
    /// The path to the history file, if any.
    history_path: Option<PathBuf>,
    /// If true, SELECT column headers will be displayed.
    show_headers: bool,
}

impl Shell {
    /// Creates a new shell with an open connection to the given database.
    fn new(database: Database) -> Result<Self> {
        let connection = database.connect(Arc::new(Registry::with_defaults()));
        connection.open()?;
        // Set up Rustyline. Make sure multiline pastes are handled normally.
        let mut editor = Editor::new()?;
        editor.set_helper(Some(InputValidator(database.dialect().dialect)));
        editor.bind_sequence(
            rustyline::KeyEvent(rustyline::KeyCode::BracketedPasteStart, Modifiers::NONE),
            rustyline::Cmd::Noop,
        );
        let history_path =
            std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".mocksql.history"));
        Ok(Self { database, connection, editor, history_path, show_headers: false })
    }

    /// Executes a SQL statement or ! command.
    fn execute(&mut self, input: &str) -> Result<()> {
        if input.starts_with('!') {
            self.execute_command(input)
        } else if !input.is_empty() {
            self.execute_sql(input)
        } else {
            Ok(())
        }
    }

    /// Executes a mocksql ! command (e.g. !help)
    fn execute_command(&mut self, input: &str) -> Result<()> {
        let mut input = input.split_ascii_whitespace();
        let Some(command) = input.next() else {
            return errinvalid!("expected command");
        };
        let args = input.collect_vec();

        match (command, args.as_slice()) {
            // Displays the dialect catalog entry for the session.
            ("!dialect", []) => {
                let DialectVersion { dialect, version } = self.database.dialect();
                println!(
                    "{} version {version} (known versions: {})",
                    dialect.name,
                    dialect.versions().iter().join(", ")
                );
            }
            ("!dialect", _) => return errinvalid!("!dialect takes no arguments"),

            // Lists the catalog dialects.
            ("!dialects", []) => {
                for dialect in Dialect::all() {
                    println!("{}: {}", dialect.name, dialect.versions().iter().join(", "));
                }
            }
            ("!dialects", _) => return errinvalid!("!dialects takes no arguments"),

            // Toggles column headers.
            ("!headers", []) => {
                self.show_headers = !self.show_headers;
                match self.show_headers {
                    true => println!("Headers enabled"),
                    false => println!("Headers disabled"),
                }
            }
            ("!headers", _) => return errinvalid!("!headers takes no arguments"),

            // Displays help.
            ("!help", []) => println!(
                r#"
Enter a SQL statement terminated by a semicolon (;) to execute it, or Ctrl-D to
exit. The following commands are also available:

    !dialect           Display the emulated dialect and version
    !dialects          List the known dialects and versions
    !headers           Toggles column headers
    !help              This help message
    !status            Display database status
    !table NAME        Display a table schema
    !tables            List tables
"#
            ),
            ("!help", _) => return errinvalid!("!help takes no arguments"),

            // Displays database status.
            ("!status", []) => {
                let status = self.database.status()?;
                println!(
                    "Database:  {} with {} tables and {} rows",
                    self.database.dialect(),
                    status.tables,
                    status.rows
                );
            }
            ("!status", _) => return errinvalid!("!status takes no arguments"),

            ("!table", [name]) => match self.database.get_table(name)? {
                Some(table) => println!("{table}"),
                None => return errinvalid!("table {name} does not exist"),
            },
            ("!table", _) => return errinvalid!("!table takes 1 argument"),

            ("!tables", []) => self.database.list_tables()?.iter().for_each(|t| println!("{}", t.name)),
            ("!tables", _) => return errinvalid!("!tables takes no arguments"),

            (command, _) => return errinvalid!("unknown command {command}"),
        }
        Ok(())
    }

    /// Executes a SQL statement and displays the results.
    fn execute_sql(&mut self, statement: &str) -> Result<()> {
        use ExecutionResult::*;
        match self.connection.create_command(statement)?.execute()? {
            Insert { count } => println!("Inserted {count} rows"),
            Delete { count } => println!("Deleted {count} rows"),
            Update { count } => println!("Updated {count} rows"),
            Merge { count } => println!("Merged {count} rows"),
            CreateTable { name } => println!("Created table {name}"),
            DropTable { name, existed } => match existed {
                true => println!("Dropped table {name}"),
                false => println!("Table {name} does not exist"),
            },
            Select { columns, rows } => {
                if self.show_headers {
                    println!("{}", columns.iter().join(", "));
                }
                for row in rows {
                    println!("{}", row?.iter().join(", "));
                }
            }
        }
        Ok(())
    }

    /// Prompts the user for input.
    fn prompt(&mut self) -> rustyline::Result<String> {
        let prompt = format!("{}> ", self.database.dialect().dialect.name);
        self.editor.readline(&prompt)
    }

    /// Runs the interactive shell.
    fn run(&mut self) -> Result<()> {
        // Load the history file, if any.
        if let Some(history_path) = &self.history_path {
            match self.editor.load_history(history_path) {
                Ok(()) => {}
                Err(ReadlineError::Io(error)) if error.kind() == std::io::ErrorKind::NotFound => {}
                Err(error) => return Err(error.into()),
            }
        }

        println!(
            "Connected to a mock {} database. Enter !help for instructions.",
            self.database.dialect()
        );

        // Prompt for commands and execute them.
        loop {
            let input = match self.prompt() {
                Ok(input) => input.trim().to_string(),
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(error) => return Err(error.into()),
            };
            self.editor.add_history_entry(&input)?;
            if let Err(error) = self.execute(&input) {
                eprintln!("Error: {error}");
            };
        }

        // Save the history file.
        if let Some(history_path) = &self.history_path {
            self.editor.save_history(history_path)?;
        }
        self.connection.close()
    }
}

/// A Rustyline helper for multiline editing. After a new line is entered, it
/// determines whether the input makes up a complete SQL statement that should
/// be executed (i.e. it's terminated by ;), or wait for further input.
#[derive(Completer, Helper, Highlighter, Hinter)]
struct InputValidator(&'static Dialect);

impl Validator for InputValidator {
    fn validate(&self, ctx: &mut ValidationContext) -> rustyline::Result<ValidationResult> {
        let input = ctx.input();
        // Empty lines and ! commands are ready.
        if input.is_empty() || input.starts_with('!') || input == ";" {
            return Ok(ValidationResult::Valid(None));
        }
        // For SQL statements, just look for any semicolon or lexer error, and
        // rely on the parser for further validation and error handling.
        if Lexer::new(input, self.0).any(|r| matches!(r, Ok((_, Token::Semicolon)) | Err(_))) {
            return Ok(ValidationResult::Valid(None));
        }
        // Otherwise, wait for more input.
        Ok(ValidationResult::Incomplete)
    }

    fn validate_while_typing(&self) -> bool {
        false // only check after completed lines
    }
}
