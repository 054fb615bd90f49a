/// Available commands, autocomplete and argument parsing
use crate::filters::{SortDirection, DEFAULT_PAGE_SIZE};
use crate::params::{parse_number_list, parse_string_list};

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "dashboard",
    aliases: &["d", "home"],
    description: "Best averages and top speeds",
  },
  Command {
    name: "stats",
    aliases: &["st", "riders"],
    description: "Rider statistics table",
  },
  Command {
    name: "speed",
    aliases: &["sp", "speeds"],
    description: "Max speed telemetry table",
  },
  Command {
    name: "season",
    aliases: &["seasons", "y"],
    description: "Filter seasons, e.g. season 2023,2024",
  },
  Command {
    name: "team",
    aliases: &["teams", "t"],
    description: "Filter teams, e.g. team Lublin",
  },
  Command {
    name: "league",
    aliases: &["leagues", "l"],
    description: "Filter leagues, e.g. league PGE",
  },
  Command {
    name: "track",
    aliases: &["tracks"],
    description: "Filter tracks (speed table)",
  },
  Command {
    name: "heats",
    aliases: &["h"],
    description: "Heats range, e.g. heats 10,60",
  },
  Command {
    name: "sort",
    aliases: &["o", "order"],
    description: "Sort by column, e.g. sort average desc",
  },
  Command {
    name: "pagesize",
    aliases: &["ps", "rows"],
    description: "Rows per page, e.g. pagesize 100",
  },
  Command {
    name: "clear",
    aliases: &["c", "reset"],
    description: "Remove all filters",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    description: "Exit selstats",
  },
];

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
  /// Switch to a page by id ("dashboard", "stats", "speed")
  Open(&'static str),
  Seasons(Vec<i32>),
  Teams(Vec<String>),
  Leagues(Vec<String>),
  Tracks(Vec<String>),
  Heats(Option<(i32, i32)>),
  /// Column name as typed; `None` clears sorting
  Sort(Option<(String, SortDirection)>),
  PageSize(usize),
  Clear,
  Quit,
}

/// Parse a submitted command line. The first word must be a command name or
/// alias; the rest are its arguments. Empty arguments reset the filter.
pub fn parse(input: &str) -> Result<Action, String> {
  let input = input.trim();
  let (word, args) = match input.split_once(char::is_whitespace) {
    Some((word, args)) => (word, args.trim()),
    None => (input, ""),
  };
  let word = word.to_lowercase();

  let Some(cmd) = COMMANDS
    .iter()
    .find(|c| c.name == word || c.aliases.contains(&word.as_str()))
  else {
    return Err(format!("Unknown command: {}", word));
  };

  // List arguments may be separated by commas or spaces
  let list = args.split_whitespace().collect::<Vec<_>>().join(",");
  let list = Some(list.as_str());

  let action = match cmd.name {
    "dashboard" | "stats" | "speed" => Action::Open(cmd.name),
    "season" => Action::Seasons(parse_number_list(list)),
    "team" => Action::Teams(parse_string_list(list)),
    "league" => Action::Leagues(parse_string_list(list)),
    "track" => Action::Tracks(parse_string_list(list)),
    "heats" => {
      if args.is_empty() {
        Action::Heats(None)
      } else {
        match parse_number_list(list).as_slice() {
          [min, max] => Action::Heats(Some((*min, *max))),
          _ => return Err("heats needs two numbers, e.g. heats 10,60".to_string()),
        }
      }
    }
    "sort" => parse_sort(args)?,
    "pagesize" if args.is_empty() => Action::PageSize(DEFAULT_PAGE_SIZE),
    "pagesize" => match args.parse::<usize>() {
      Ok(size) if size > 0 => Action::PageSize(size),
      _ => return Err(format!("Invalid page size: {}", args)),
    },
    "clear" => Action::Clear,
    "quit" => Action::Quit,
    other => return Err(format!("Unknown command: {}", other)),
  };
  Ok(action)
}

fn parse_sort(args: &str) -> Result<Action, String> {
  let mut words: Vec<&str> = args.split_whitespace().collect();
  if words.is_empty() {
    return Ok(Action::Sort(None));
  }

  // A trailing asc/desc is the direction; the rest names the column
  let direction = match words.last().and_then(|w| SortDirection::parse(w)) {
    Some(direction) if words.len() > 1 => {
      words.pop();
      direction
    }
    _ => SortDirection::Asc,
  };
  Ok(Action::Sort(Some((words.join(" "), direction))))
}

/// Get autocomplete suggestions for a given input
///
/// Only the first word is matched; once arguments are being typed no
/// suggestions are offered.
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input_lower = input.trim_start().to_lowercase();

  if input_lower.contains(char::is_whitespace) {
    return Vec::new();
  }

  if input_lower.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u32)> = Vec::new();

  for cmd in COMMANDS {
    // Exact match on name
    if cmd.name == input_lower {
      matches.push((cmd, 0));
      continue;
    }

    if cmd.aliases.contains(&input_lower.as_str()) {
      matches.push((cmd, 1));
      continue;
    }

    if cmd.name.starts_with(&input_lower) {
      matches.push((cmd, 2));
      continue;
    }

    if cmd.aliases.iter().any(|a| a.starts_with(&input_lower)) {
      matches.push((cmd, 3));
      continue;
    }

    // Fuzzy match (contains)
    if cmd.name.contains(&input_lower) {
      matches.push((cmd, 4));
      continue;
    }

    if cmd.aliases.iter().any(|a| a.contains(&input_lower)) {
      matches.push((cmd, 5));
    }
  }

  matches.sort_by_key(|(_, priority)| *priority);

  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_input_returns_all() {
    let suggestions = get_suggestions("");
    assert_eq!(suggestions.len(), COMMANDS.len());
  }

  #[test]
  fn test_exact_match() {
    let suggestions = get_suggestions("stats");
    assert_eq!(suggestions[0].name, "stats");
  }

  #[test]
  fn test_alias_match() {
    let suggestions = get_suggestions("y");
    assert_eq!(suggestions[0].name, "season");
  }

  #[test]
  fn test_prefix_match() {
    let suggestions = get_suggestions("lea");
    assert_eq!(suggestions[0].name, "league");
  }

  #[test]
  fn test_fuzzy_match() {
    let suggestions = get_suggestions("shbo");
    assert_eq!(suggestions[0].name, "dashboard");
  }

  #[test]
  fn test_no_suggestions_while_typing_arguments() {
    assert!(get_suggestions("season 20").is_empty());
  }

  #[test]
  fn test_parse_pages() {
    assert_eq!(parse("speed"), Ok(Action::Open("speed")));
    assert_eq!(parse("home"), Ok(Action::Open("dashboard")));
    assert_eq!(parse("q"), Ok(Action::Quit));
  }

  #[test]
  fn test_parse_lists_accept_commas_and_spaces() {
    assert_eq!(
      parse("season 2023, 2024 x"),
      Ok(Action::Seasons(vec![2023, 2024]))
    );
    assert_eq!(
      parse("team Lublin Wroclaw"),
      Ok(Action::Teams(vec!["Lublin".to_string(), "Wroclaw".to_string()]))
    );
    assert_eq!(parse("league"), Ok(Action::Leagues(Vec::new())));
  }

  #[test]
  fn test_parse_heats() {
    assert_eq!(parse("heats 10,60"), Ok(Action::Heats(Some((10, 60)))));
    assert_eq!(parse("heats"), Ok(Action::Heats(None)));
    assert!(parse("heats 10").is_err());
  }

  #[test]
  fn test_parse_sort() {
    assert_eq!(
      parse("sort average desc"),
      Ok(Action::Sort(Some(("average".to_string(), SortDirection::Desc))))
    );
    assert_eq!(
      parse("sort Max Speed"),
      Ok(Action::Sort(Some(("Max Speed".to_string(), SortDirection::Asc))))
    );
    assert_eq!(parse("sort"), Ok(Action::Sort(None)));
  }

  #[test]
  fn test_parse_page_size() {
    assert_eq!(parse("rows 100"), Ok(Action::PageSize(100)));
    assert_eq!(parse("pagesize"), Ok(Action::PageSize(DEFAULT_PAGE_SIZE)));
    assert!(parse("pagesize 0").is_err());
    assert!(parse("pagesize many").is_err());
  }

  #[test]
  fn test_parse_unknown() {
    assert!(parse("boards").is_err());
  }
}
