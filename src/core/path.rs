//! 远端相对路径规范化

/// 规范化远端路径：统一分隔符为 /，去掉存储区前缀、开头的 / 以及多余的分隔符
///
/// 只有以 `/<zone>` 开头的路径才会去掉存储区前缀，已经是相对路径的
/// `zone/...` 保持不变。
pub fn normalize_path(raw: &str, zone: Option<&str>) -> String {
    let unified = raw.replace('\\', "/");
    let mut rest = unified.as_str();

    if let Some(zone) = zone.filter(|z| !z.is_empty()) {
        let marker = format!("/{}", zone);
        if let Some(stripped) = rest.strip_prefix(marker.as_str()) {
            if stripped.is_empty() || stripped.starts_with('/') {
                rest = stripped;
            }
        }
    }

    rest.split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// 用单个 / 连接同步前缀和相对路径
pub fn join_remote(prefix: &str, relative: &str) -> String {
    match (prefix.is_empty(), relative.is_empty()) {
        (true, _) => relative.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{}/{}", prefix, relative),
    }
}
