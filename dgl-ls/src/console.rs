//! Line commands and manifest navigation for the annotator console

use dgl_common::catalog::{self, ITEMS};
use dgl_common::{Manifest, ManifestImage, ViewType};
use std::fmt;

/// One parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Next,
    Prev,
    Goto(String),
    /// Catalog key of the item to flip
    Toggle(&'static str),
    View(ViewType),
    Reviewed(bool),
    Items,
    Status,
    Progress,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(pub String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ParseError {}

pub const HELP: &str = "\
Commands:
  next | n                 next image
  prev | p                 previous image
  goto <id>                jump to an image id (e.g. 0042)
  toggle <n|key>           flip checklist item n (1-60) or key (m01_head)
  view <front|profile|mixed|unknown>
  reviewed <on|off>
  items                    list checklist items of the current image
  status                   current image and save state
  progress                 reviewed images out of the manifest
  help
  quit";

impl Command {
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let mut words = line.split_whitespace();
        let verb = words
            .next()
            .ok_or_else(|| ParseError("empty command".to_string()))?;
        let arg = words.next();
        if words.next().is_some() {
            return Err(ParseError(format!("too many arguments for {}", verb)));
        }

        let required = |what: &str| {
            arg.ok_or_else(|| ParseError(format!("{} needs {}", verb, what)))
        };

        match verb.to_ascii_lowercase().as_str() {
            "next" | "n" => Ok(Command::Next),
            "prev" | "p" => Ok(Command::Prev),
            "goto" | "g" => Ok(Command::Goto(format!("{:0>4}", required("an image id")?))),
            "toggle" | "t" => parse_item(required("an item number or key")?).map(Command::Toggle),
            "view" | "v" => {
                let value = required("a view type")?;
                ViewType::parse(value)
                    .map(Command::View)
                    .ok_or_else(|| ParseError(format!("unknown view type: {}", value)))
            }
            "reviewed" | "r" => match required("on or off")? {
                "on" | "yes" | "true" => Ok(Command::Reviewed(true)),
                "off" | "no" | "false" => Ok(Command::Reviewed(false)),
                other => Err(ParseError(format!("expected on or off, got {}", other))),
            },
            "items" | "i" => Ok(Command::Items),
            "status" | "s" => Ok(Command::Status),
            "progress" => Ok(Command::Progress),
            "help" | "h" | "?" => Ok(Command::Help),
            "quit" | "q" | "exit" => Ok(Command::Quit),
            other => Err(ParseError(format!("unknown command: {} (try help)", other))),
        }
    }
}

/// Item key from a 1-based catalog position or a key
fn parse_item(value: &str) -> Result<&'static str, ParseError> {
    if let Ok(position) = value.parse::<usize>() {
        return position
            .checked_sub(1)
            .and_then(|index| ITEMS.get(index))
            .map(|item| item.key)
            .ok_or_else(|| ParseError(format!("item number must be 1-{}", ITEMS.len())));
    }
    catalog::index_of(value)
        .map(|index| ITEMS[index].key)
        .ok_or_else(|| ParseError(format!("unknown checklist item: {}", value)))
}

/// Cursor over the manifest images; movement is clamped at both ends
#[derive(Debug, Clone)]
pub struct Navigator {
    images: Vec<ManifestImage>,
    index: usize,
}

impl Navigator {
    /// None when the manifest has no images
    pub fn new(manifest: &Manifest) -> Option<Self> {
        (!manifest.images.is_empty()).then(|| Self {
            images: manifest.images.clone(),
            index: 0,
        })
    }

    pub fn current(&self) -> &ManifestImage {
        &self.images[self.index]
    }

    pub fn position(&self) -> (usize, usize) {
        (self.index + 1, self.images.len())
    }

    /// Move forward; false when already at the last image
    pub fn next(&mut self) -> bool {
        if self.index + 1 < self.images.len() {
            self.index += 1;
            true
        } else {
            false
        }
    }

    /// Move back; false when already at the first image
    pub fn prev(&mut self) -> bool {
        if self.index > 0 {
            self.index -= 1;
            true
        } else {
            false
        }
    }

    pub fn goto(&mut self, id: &str) -> bool {
        match self.images.iter().position(|image| image.id == id) {
            Some(index) => {
                self.index = index;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> Manifest {
        Manifest {
            schema_version: "dap_male_v1".to_string(),
            seed: Some(1),
            images: ["0003", "0010", "0042"]
                .iter()
                .map(|id| ManifestImage {
                    id: id.to_string(),
                    age: 10,
                    path: format!("/images/10/{}.jpg", id),
                    split: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("next").unwrap(), Command::Next);
        assert_eq!(Command::parse("  P ").unwrap(), Command::Prev);
        assert_eq!(Command::parse("goto 42").unwrap(), Command::Goto("0042".to_string()));
        assert_eq!(Command::parse("toggle 1").unwrap(), Command::Toggle("m01_head"));
        assert_eq!(Command::parse("t m02_neck").unwrap(), Command::Toggle("m02_neck"));
        assert_eq!(Command::parse("view profile").unwrap(), Command::View(ViewType::Profile));
        assert_eq!(Command::parse("reviewed on").unwrap(), Command::Reviewed(true));
        assert_eq!(Command::parse("q").unwrap(), Command::Quit);
    }

    #[test]
    fn test_parse_errors() {
        assert!(Command::parse("").is_err());
        assert!(Command::parse("toggle 0").is_err());
        assert!(Command::parse("toggle 61").is_err());
        assert!(Command::parse("toggle wings").is_err());
        assert!(Command::parse("view frontal").is_err());
        assert!(Command::parse("goto").is_err());
        assert!(Command::parse("next now").is_err());
        assert!(Command::parse("dance").is_err());
    }

    #[test]
    fn test_navigation_is_clamped() {
        let mut nav = Navigator::new(&manifest()).unwrap();
        assert!(!nav.prev());
        assert_eq!(nav.current().id, "0003");
        assert!(nav.next());
        assert!(nav.next());
        assert!(!nav.next());
        assert_eq!(nav.current().id, "0042");
        assert_eq!(nav.position(), (3, 3));
    }

    #[test]
    fn test_goto() {
        let mut nav = Navigator::new(&manifest()).unwrap();
        assert!(nav.goto("0010"));
        assert_eq!(nav.position(), (2, 3));
        assert!(!nav.goto("0999"));
        assert_eq!(nav.current().id, "0010");
    }

    #[test]
    fn test_empty_manifest_has_no_navigator() {
        let mut empty = manifest();
        empty.images.clear();
        assert!(Navigator::new(&empty).is_none());
    }
}
