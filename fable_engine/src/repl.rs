//! The interactive play loop.
//!
//! Game commands go straight to the [`LogicEnvironment`]; lines starting with `:` are
//! meta commands (saves, hints, listings).

mod input;

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use log::info;

use crate::env::LogicEnvironment;
use crate::save_files::{
    SaveFileStatus, build_save_entries, format_modified, load_save_file, save_dir_for_game, slot_path, write_save_file,
};
use crate::style::GameStyle;

use input::{InputEvent, InputManager};

/// Control flow signal used by handlers to exit the REPL.
pub enum ReplControl {
    Continue,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaCommand {
    Help,
    Quit,
    Save(String),
    Load(String),
    Saves,
    Hint,
    Commands,
    Score,
    Facts,
    Unknown(String),
}

/// Parse a `:`-prefixed line. Returns `None` for ordinary game commands.
pub fn parse_meta(line: &str) -> Option<MetaCommand> {
    let rest = line.trim().strip_prefix(':')?;
    let (verb, arg) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let slot = || {
        let arg = arg.trim();
        if arg.is_empty() { "quicksave".to_string() } else { arg.to_string() }
    };
    Some(match verb.to_lowercase().as_str() {
        "help" | "h" => MetaCommand::Help,
        "quit" | "q" | "exit" => MetaCommand::Quit,
        "save" => MetaCommand::Save(slot()),
        "load" => MetaCommand::Load(slot()),
        "saves" => MetaCommand::Saves,
        "hint" => MetaCommand::Hint,
        "commands" | "cmds" => MetaCommand::Commands,
        "score" => MetaCommand::Score,
        "facts" => MetaCommand::Facts,
        other => MetaCommand::Unknown(other.to_string()),
    })
}

fn print_wrapped(text: &str) {
    let width = textwrap::termwidth().min(100);
    println!("{}", textwrap::fill(text, width));
}

/// Run the read-eval-print loop until the player quits or input ends.
///
/// # Errors
/// Propagates engine errors other than invalid commands, and save-file failures.
pub fn run_repl(env: &mut LogicEnvironment) -> Result<()> {
    let save_dir = save_dir_for_game(env.game().uuid());
    let mut input_manager = InputManager::new();

    print_wrapped(&env.reset().description_style().to_string());
    loop {
        input_manager.set_completions(env.admissible_commands()?);
        let progression = env.progression()?;
        let prompt = format!("\n[Moves: {}|Score: {}]>> ", progression.moves(), progression.score());

        let line = match input_manager.read_line(&prompt) {
            Ok(InputEvent::Line(line)) => line,
            Ok(InputEvent::Eof) => break,
            Ok(InputEvent::Interrupted) => {
                println!("{}", "Command canceled.".italic());
                continue;
            },
            Err(err) => {
                println!("{}", format!("Failed to read input ({err}). Try again.").error_style());
                continue;
            },
        };
        if line.trim().is_empty() {
            continue;
        }

        if let Some(meta) = parse_meta(&line) {
            if let ReplControl::Quit = meta_handler(env, &save_dir, &meta)? {
                break;
            }
            continue;
        }

        let outcome = env.step(&line)?;
        if outcome.observation.starts_with("Invalid command") {
            println!("{}", outcome.observation.denied_style());
        } else {
            print_wrapped(&outcome.observation);
        }
        if outcome.done {
            println!("{}", "Type :quit to leave or :load to resume a save.".subheading_style());
        }
    }
    let progression = env.progression()?;
    info!(
        "session ended after {} moves with a score of {}/{}",
        progression.moves(),
        progression.score(),
        progression.max_score()
    );
    Ok(())
}

fn meta_handler(env: &mut LogicEnvironment, save_dir: &Path, meta: &MetaCommand) -> Result<ReplControl> {
    match meta {
        MetaCommand::Help => help_handler(),
        MetaCommand::Quit => {
            let progression = env.progression()?;
            println!(
                "Final score: {} of {} in {} moves.",
                progression.score().to_string().score_style(),
                progression.max_score(),
                progression.moves()
            );
            return Ok(ReplControl::Quit);
        },
        MetaCommand::Save(slot) => {
            let path = write_save_file(save_dir, slot, &env.save()?)?;
            println!("Saved to {}.", path.display().to_string().entity_style());
        },
        MetaCommand::Load(slot) => load_handler(env, &slot_path(save_dir, slot))?,
        MetaCommand::Saves => saves_handler(save_dir)?,
        MetaCommand::Hint => match env.policy_commands()? {
            Some(plan) if plan.is_empty() => println!("Nothing left to do."),
            Some(plan) => println!("Try: {}", plan[0].command_style()),
            None => println!("{}", "No hint available.".denied_style()),
        },
        MetaCommand::Commands => {
            for command in env.admissible_commands()? {
                println!("  {}", command.command_style());
            }
        },
        MetaCommand::Score => quests_handler(env)?,
        MetaCommand::Facts => {
            for fact in env.facts()? {
                println!("  {fact}");
            }
        },
        MetaCommand::Unknown(verb) => {
            println!("{}", format!("Unknown meta command ':{verb}'. Try :help.").error_style());
        },
    }
    Ok(ReplControl::Continue)
}

fn help_handler() {
    println!("{}", "Commands".subheading_style());
    println!("  Type any admissible command, e.g. {}.", "open old chest".command_style());
    for (command, text) in [
        (":commands", "list the commands that work right now"),
        (":hint", "suggest the next step of a winning walkthrough"),
        (":score", "show quests and score"),
        (":facts", "dump the current state"),
        (":save [slot]", "save the game"),
        (":load [slot]", "load a saved game"),
        (":saves", "list save slots"),
        (":quit", "leave the game"),
    ] {
        println!("  {:<14} {text}", command.command_style());
    }
}

fn quests_handler(env: &LogicEnvironment) -> Result<()> {
    let progression = env.progression()?;
    for (idx, quest) in env.game().quests.iter().enumerate() {
        let label = quest.desc.clone().unwrap_or_else(|| format!("quest #{idx}"));
        match progression.quest_status(idx) {
            Some(status) if status.is_completed() => println!("  {}", label.quest_done_style()),
            Some(status) if status.is_failed() => println!("  {}", label.quest_failed_style()),
            _ => println!("  {label}"),
        }
    }
    println!(
        "Score: {} of {}",
        progression.score().to_string().score_style(),
        progression.max_score()
    );
    Ok(())
}

fn load_handler(env: &mut LogicEnvironment, path: &Path) -> Result<()> {
    if !path.exists() {
        println!("{}", format!("No save at {}.", path.display()).denied_style());
        return Ok(());
    }
    let saved = load_save_file(path)?;
    env.load(&saved)?;
    println!("Loaded {}.", path.display().to_string().entity_style());
    print_wrapped(&env.describe_room());
    Ok(())
}

fn saves_handler(save_dir: &Path) -> Result<()> {
    let entries = build_save_entries(save_dir)?;
    if entries.is_empty() {
        println!("No saved games.");
        return Ok(());
    }
    for entry in entries {
        let age = entry.modified.map_or_else(|| "unknown".to_string(), format_modified);
        let detail = match (&entry.status, &entry.summary) {
            (SaveFileStatus::Ready, Some(summary)) => {
                format!("{} moves, score {}", summary.moves, summary.score)
            },
            (SaveFileStatus::VersionMismatch { save_version, .. }, _) => format!("saved by v{save_version}"),
            (SaveFileStatus::Corrupted { message }, _) => message.error_style().to_string(),
            (SaveFileStatus::Ready, None) => String::new(),
        };
        println!("  {:<16} {age:<10} {detail}", entry.slot.entity_style());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_commands_parse() {
        assert_eq!(parse_meta(":save Before Boss"), Some(MetaCommand::Save("Before Boss".into())));
        assert_eq!(parse_meta(":load"), Some(MetaCommand::Load("quicksave".into())));
        assert_eq!(parse_meta("  :Q"), Some(MetaCommand::Quit));
        assert_eq!(parse_meta(":dance"), Some(MetaCommand::Unknown("dance".into())));
    }

    #[test]
    fn game_commands_are_not_meta() {
        assert_eq!(parse_meta("open old chest"), None);
        assert_eq!(parse_meta("look"), None);
    }
}
