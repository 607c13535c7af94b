use anyhow::Result;
use dialoguer::{theme::ColorfulTheme, Confirm, Select};
use std::path::Path;

use crate::orphans::{OrphanAction, Prompter};

const ACTIONS: &[(&str, OrphanAction)] = &[
    ("Skip (leave them alone)", OrphanAction::Skip),
    ("Prune (delete the local directories)", OrphanAction::Prune),
    ("Add (declare them in the config)", OrphanAction::Add),
];

/// Terminal prompts
#[derive(Default)]
pub struct DialoguerPrompter {
    theme: ColorfulTheme,
}

impl DialoguerPrompter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Prompter for DialoguerPrompter {
    fn choose_orphan_action(&self, source_name: &str, orphans: &[String]) -> Result<OrphanAction> {
        println!();
        println!("Source {} has {} untracked repos:", source_name, orphans.len());
        for name in orphans {
            println!("  - {}", name);
        }

        let labels: Vec<&str> = ACTIONS.iter().map(|(label, _)| *label).collect();
        let index = Select::with_theme(&self.theme)
            .with_prompt("What should happen to them?")
            .items(&labels)
            .default(0)
            .interact()?;

        Ok(ACTIONS[index].1)
    }

    fn confirm_prune(&self, orphans: &[String]) -> Result<bool> {
        let count = match orphans.len() {
            1 => "1 directory".to_string(),
            n => format!("{} directories", n),
        };
        Ok(Confirm::with_theme(&self.theme)
            .with_prompt(format!("Permanently delete {} ({})?", count, orphans.join(", ")))
            .default(false)
            .interact()?)
    }

    fn confirm_create_dir(&self, path: &Path) -> Result<bool> {
        Ok(Confirm::with_theme(&self.theme)
            .with_prompt(format!("{} does not exist. Create it?", path.display()))
            .default(true)
            .interact()?)
    }
}
