//! `inshallah roles` (role template catalog).

use crate::cli::print_json;
use crate::config::repo_root_from_cwd;
use crate::error::Result;
use crate::prompt::list_roles;

pub fn execute(json: bool) -> Result<i32> {
    let roles = list_roles(&repo_root_from_cwd());
    if json {
        print_json(&roles);
    } else if roles.is_empty() {
        println!("No roles defined (add .inshallah/roles/<name>.md)");
    } else {
        for role in roles {
            let cli = role.cli.as_deref().unwrap_or("-");
            let model = role.model.as_deref().unwrap_or("-");
            println!("{}  cli={cli} model={model}  {}", role.name, role.description);
        }
    }
    Ok(0)
}
