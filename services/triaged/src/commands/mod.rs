pub mod apply;
pub mod check;
pub mod scan;
pub mod status;
pub mod watch;

/// Parses `owner/repo#N` into its three parts.
pub fn parse_issue_ref(s: &str) -> Result<(String, String, i64), String> {
    let (repo_part, number_part) = s
        .split_once('#')
        .ok_or_else(|| format!("expected owner/repo#N, got {s:?}"))?;
    let (owner, name) = repo_part
        .split_once('/')
        .ok_or_else(|| format!("expected owner/repo#N, got {s:?}"))?;
    let number: i64 = number_part
        .parse()
        .map_err(|_| format!("invalid issue number in {s:?}"))?;
    Ok((owner.to_owned(), name.to_owned(), number))
}

/// Parses `owner/repo` into its two parts.
pub fn parse_repo_ref(s: &str) -> Result<(String, String), String> {
    s.split_once('/')
        .map(|(o, n)| (o.to_owned(), n.to_owned()))
        .ok_or_else(|| format!("expected owner/repo, got {s:?}"))
}

/// Parses a duration like `5m`, `30s`, `2h`; a bare number is seconds.
pub fn parse_duration(s: &str) -> Result<std::time::Duration, String> {
    let s = s.trim();
    if let Some(digits) = s.strip_suffix('s') {
        return digits
            .parse()
            .map(std::time::Duration::from_secs)
            .map_err(|_| format!("invalid duration {s:?}"));
    }
    if let Some(digits) = s.strip_suffix('m') {
        return digits
            .parse::<u64>()
            .map(|m| std::time::Duration::from_secs(m * 60))
            .map_err(|_| format!("invalid duration {s:?}"));
    }
    if let Some(digits) = s.strip_suffix('h') {
        return digits
            .parse::<u64>()
            .map(|h| std::time::Duration::from_secs(h * 3600))
            .map_err(|_| format!("invalid duration {s:?}"));
    }
    s.parse()
        .map(std::time::Duration::from_secs)
        .map_err(|_| format!("invalid duration {s:?}"))
}
