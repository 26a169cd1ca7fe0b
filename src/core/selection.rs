//! Choosing which packages to build

/// Packages requested for a run
///
/// With a change set from git, the result is the change set, narrowed to the
/// explicitly named packages when there are any. Without one, it is the
/// named packages. Order follows the change set, or the command line.
pub fn select_packages(changed: Option<Vec<String>>, explicit: &[String]) -> Vec<String> {
    let mut selected = match changed {
        Some(changed) if explicit.is_empty() => changed,
        Some(changed) => changed
            .into_iter()
            .filter(|name| explicit.contains(name))
            .collect(),
        None => explicit.to_vec(),
    };

    let mut seen = std::collections::HashSet::new();
    selected.retain(|name| !name.is_empty() && seen.insert(name.clone()));
    selected
}
