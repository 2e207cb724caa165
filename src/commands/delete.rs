use anyhow::Result;
use std::io::{self, Write};

use trackdash::IssueStore;

pub fn run<S: IssueStore + ?Sized>(store: &S, id: i64, force: bool) -> Result<()> {
    if !force {
        print!("Delete issue #{}? [y/N] ", id);
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    store.delete(id)?;
    println!("Deleted issue #{}", id);
    Ok(())
}
