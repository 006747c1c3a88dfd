use log::*;

use crate::{Error, Result};

/// Which accesses make a watchpoint trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    Write,
    Read,
    Access,
}

impl WatchKind {
    pub fn command(self) -> &'static str {
        match self {
            WatchKind::Write => "watch",
            WatchKind::Read => "rwatch",
            WatchKind::Access => "awatch",
        }
    }
}

impl TryFrom<&str> for WatchKind {
    type Error = String;

    fn try_from(val: &str) -> std::result::Result<Self, Self::Error> {
        match val {
            "watch" | "write" => Ok(WatchKind::Write),
            "rwatch" | "read" => Ok(WatchKind::Read),
            "awatch" | "access" => Ok(WatchKind::Access),
            _ => Err(format!("unknown watch kind {val:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    pub expression: String,
    pub kind: WatchKind,
    /// Number of hits to skip before the debugger stops.
    pub ignore_count: u32,
}

/// A list of watchpoints to be set in one go, together with the number of
/// hits each of them should let pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchRecipe {
    targets: Vec<WatchTarget>,
}

impl WatchRecipe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watch(
        mut self,
        expression: impl Into<String>,
        kind: WatchKind,
        ignore_count: u32,
    ) -> Self {
        self.targets.push(WatchTarget {
            expression: expression.into(),
            kind,
            ignore_count,
        });
        self
    }

    pub fn targets(&self) -> &[WatchTarget] {
        &self.targets
    }

    /// Watches the reference counts of the preview2 adapter's `Arc`.
    ///
    /// The weak count is touched three times and the strong count once during
    /// normal setup, so the watchpoints only stop at the write after that.
    pub fn preview2_adapter() -> Self {
        Self::new()
            .watch("self.preview2_adapter.ptr.pointer.weak", WatchKind::Write, 3)
            .watch("self.preview2_adapter.ptr.pointer.strong", WatchKind::Write, 1)
    }

    /// Line announcing the address printed by the final `print &` command.
    pub fn location_label(&self) -> Option<String> {
        self.targets
            .last()
            .map(|target| format!("{} is at following location:", target.expression))
    }

    /// Renders the debugger commands setting up this recipe.
    ///
    /// `first_breakpoint_number` is the number the debugger will assign to the
    /// first new watchpoint. Subsequent watchpoints are numbered sequentially.
    pub fn to_commands(&self, first_breakpoint_number: u32) -> Result<Vec<String>> {
        if let Some(target) = self
            .targets
            .iter()
            .find(|target| target.expression.trim().is_empty())
        {
            error!("Refusing to watch empty expression in {target:?}");
            return Err(Error::EmptyExpression);
        }

        let mut commands: Vec<String> = self
            .targets
            .iter()
            .map(|target| format!("{} -location {}", target.kind.command(), target.expression))
            .collect();

        for (number, target) in (first_breakpoint_number..).zip(&self.targets) {
            if target.ignore_count > 0 {
                commands.push(format!("ignore {number} {}", target.ignore_count));
            }
        }

        if let Some(last) = self.targets.last() {
            commands.push(format!("print &{}", last.expression));
        }

        debug!("Watch recipe expands to {} commands", commands.len());

        Ok(commands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview2_adapter_commands() {
        let commands = WatchRecipe::preview2_adapter().to_commands(2).unwrap();

        assert_eq!(
            commands,
            [
                "watch -location self.preview2_adapter.ptr.pointer.weak",
                "watch -location self.preview2_adapter.ptr.pointer.strong",
                "ignore 2 3",
                "ignore 3 1",
                "print &self.preview2_adapter.ptr.pointer.strong",
            ]
        );
    }

    #[test]
    fn zero_ignore_count_emits_no_ignore() {
        let recipe = WatchRecipe::new()
            .watch("a", WatchKind::Read, 0)
            .watch("b", WatchKind::Access, 5);

        assert_eq!(
            recipe.to_commands(7).unwrap(),
            ["rwatch -location a", "awatch -location b", "ignore 8 5", "print &b"]
        );
    }

    #[test]
    fn empty_recipe_has_no_commands() {
        let recipe = WatchRecipe::new();
        assert!(recipe.to_commands(1).unwrap().is_empty());
        assert_eq!(recipe.location_label(), None);
    }

    #[test]
    fn labels_last_watched_location() {
        assert_eq!(
            WatchRecipe::preview2_adapter().location_label().as_deref(),
            Some("self.preview2_adapter.ptr.pointer.strong is at following location:")
        );
    }

    #[test]
    fn rejects_empty_expression() {
        let recipe = WatchRecipe::new().watch("  ", WatchKind::Write, 1);
        assert!(matches!(recipe.to_commands(1), Err(Error::EmptyExpression)));
    }

    #[test]
    fn parses_watch_kinds() {
        assert_eq!(WatchKind::try_from("awatch"), Ok(WatchKind::Access));
        assert_eq!(WatchKind::try_from("write"), Ok(WatchKind::Write));
        assert!(WatchKind::try_from("hbreak").is_err());
    }
}
