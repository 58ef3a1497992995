// 📋 Line Menu - Numbered prompt loop over any reader/writer
// Core errors are caught here and printed; terminal I/O failures and
// resource exhaustion end the loop with an error.

use crate::error::LedgerError;
use crate::tracker::ExpenseTracker;
use anyhow::{Context, Result};
use std::io::{BufRead, Write};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Add,
    Display,
    Total,
    SaveAndExit,
}

impl MenuChoice {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "1" => Some(MenuChoice::Add),
            "2" => Some(MenuChoice::Display),
            "3" => Some(MenuChoice::Total),
            "4" => Some(MenuChoice::SaveAndExit),
            _ => None,
        }
    }
}

/// How the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuExit {
    Saved,
    EndOfInput,
}

pub fn print_instructions<W: Write>(out: &mut W) -> Result<()> {
    writeln!(out, "Welcome to the Personal Expense Tracker!")?;
    writeln!(out, "Organize your finances with ease.")?;
    writeln!(out, "1. Add Expense\n2. Display Expenses\n3. Calculate Total\n4. Save & Exit\n")?;
    Ok(())
}

pub fn print_expenses<W: Write>(out: &mut W, tracker: &ExpenseTracker) -> Result<()> {
    if tracker.list().is_empty() {
        writeln!(out, "No expenses recorded yet.")?;
        return Ok(());
    }
    writeln!(out, "\nRecorded Expenses:")?;
    for entry in tracker.list() {
        writeln!(out, "- {}", entry)?;
    }
    Ok(())
}

/// Print a recoverable core error. Resource exhaustion is handed back
/// to the caller instead.
pub fn report_error<W: Write>(out: &mut W, err: LedgerError) -> Result<()> {
    if err.is_resource() {
        return Err(err.into());
    }
    writeln!(out, "Error: {}", err)?;
    Ok(())
}

/// Prompt and read one line. `None` at end of input.
fn prompt<R: BufRead, W: Write>(input: &mut R, out: &mut W, text: &str) -> Result<Option<String>> {
    write!(out, "{}", text)?;
    out.flush()?;

    let mut line = String::new();
    let read = input.read_line(&mut line).context("Failed to read from input")?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

pub fn run_menu<R: BufRead, W: Write>(
    tracker: &mut ExpenseTracker,
    input: &mut R,
    out: &mut W,
) -> Result<MenuExit> {
    loop {
        print_instructions(out)?;
        let Some(choice) = prompt(input, out, "Choose an option: ")? else {
            warn!("input closed before Save & Exit; ledger not saved");
            return Ok(MenuExit::EndOfInput);
        };

        match MenuChoice::parse(&choice) {
            Some(MenuChoice::Add) => {
                let Some(category) = prompt(input, out, "Enter category: ")? else {
                    return Ok(MenuExit::EndOfInput);
                };
                let Some(amount) = prompt(input, out, "Enter amount: $")? else {
                    return Ok(MenuExit::EndOfInput);
                };
                match tracker.add(&category, &amount) {
                    Ok(entry) => writeln!(
                        out,
                        "Added expense: {} - ${}",
                        entry.category(),
                        entry.amount()
                    )?,
                    Err(err) => report_error(out, err)?,
                }
            }
            Some(MenuChoice::Display) => print_expenses(out, tracker)?,
            Some(MenuChoice::Total) => match tracker.total() {
                Ok(total) => writeln!(out, "\nTotal spending: ${}", total)?,
                Err(err) => report_error(out, err)?,
            },
            Some(MenuChoice::SaveAndExit) => {
                let report = match tracker.save_and_wait() {
                    Ok(report) => report,
                    Err(err) => {
                        report_error(out, err)?;
                        continue;
                    }
                };
                if report.succeeded() {
                    writeln!(out, "Expenses saved to file: {}", report.destination)?;
                    return Ok(MenuExit::Saved);
                }
                match &report.error {
                    Some(err) => writeln!(out, "Error: Unable to save expenses to file. {}", err)?,
                    None => writeln!(out, "Error: Unable to save expenses to file.")?,
                }
            }
            None => {
                debug!(choice = %choice, "unrecognized menu choice");
                writeln!(out, "Invalid choice. Try again.")?;
            }
        }
    }
}
