use anyhow::Result;

use crate::ui::summary::print_engines;

pub fn run() -> Result<()> {
    print_engines();
    Ok(())
}
