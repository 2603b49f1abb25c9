use colored::{ColoredString, Colorize};
use declarative::Action;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Diff marker for an action: `+` create, `-` remove, `~` modify
pub fn action_symbol(action: Action) -> ColoredString {
    match action {
        Action::Created => "+".green(),
        Action::Removed => "-".red(),
        Action::Modified => "~".yellow(),
        Action::NoChange => "○".dimmed(),
    }
}

/// Human label for a resource type
pub fn type_label(resource_type: &str) -> &str {
    match resource_type {
        "pool" => "Pools",
        "group" => "Groups",
        "role" => "Roles",
        "user" => "Users",
        "acl" => "ACLs",
        "storage" => "Storage",
        "metric_server" => "Metric servers",
        "sdn" => "SDN",
        "firewall_alias" => "Firewall aliases",
        "firewall_ipset" => "Firewall IP sets",
        "firewall_group" => "Security groups",
        "firewall_rule" => "Security group assignments",
        other => other,
    }
}

/// `1 resource`, `2 resources`
pub fn count(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("{n} {noun}")
    } else {
        format!("{n} {noun}s")
    }
}
