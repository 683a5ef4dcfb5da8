// 文件名清理
//
// 用户提交的名称（新建文件夹、重命名、上传文件名）在拼接路径前必须经过清理，
// 保证名称本身无法携带分隔符或穿越序列

/// Windows 保留设备名
const WINDOWS_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// 清理用户提交的名称
///
/// - 路径分隔符视为空白，空白折叠为 `_`
/// - 只保留字母数字（含 Unicode）、`_`、`.`、`-`
/// - 去掉首尾的 `.` 和 `_`
/// - Windows 设备名前加 `_`
///
/// 清理后为空返回 None
pub fn sanitize_name(raw: &str) -> Option<String> {
    let spaced = raw.replace(['/', '\\'], " ");
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");

    let filtered: String = joined
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    let trimmed = filtered.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        return None;
    }

    let stem = trimmed.split('.').next().unwrap_or(trimmed).to_uppercase();
    if WINDOWS_DEVICE_NAMES.contains(&stem.as_str()) {
        return Some(format!("_{}", trimmed));
    }

    Some(trimmed.to_string())
}

/// 取扩展名（小写，不带点）
pub fn extension_of(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// 检查扩展名是否在允许列表中
pub fn has_allowed_extension(name: &str, allowed: &[String]) -> bool {
    match extension_of(name) {
        Some(ext) => allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext)),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_plain_names() {
        assert_eq!(sanitize_name("report.pdf").as_deref(), Some("report.pdf"));
        assert_eq!(sanitize_name("  My Folder  ").as_deref(), Some("My_Folder"));
        assert_eq!(sanitize_name("照片-2024.jpg").as_deref(), Some("照片-2024.jpg"));
    }

    #[test]
    fn test_sanitize_strips_traversal() {
        assert_eq!(sanitize_name("../../etc/passwd").as_deref(), Some("etc_passwd"));
        assert_eq!(sanitize_name("..\\..\\boot.ini").as_deref(), Some("boot.ini"));
        assert_eq!(sanitize_name("/abs/name.txt").as_deref(), Some("abs_name.txt"));
    }

    #[test]
    fn test_sanitize_rejects_empty() {
        assert_eq!(sanitize_name(""), None);
        assert_eq!(sanitize_name("   "), None);
        assert_eq!(sanitize_name(".."), None);
        assert_eq!(sanitize_name("///"), None);
        assert_eq!(sanitize_name("$%*"), None);
    }

    #[test]
    fn test_sanitize_removes_special_chars() {
        assert_eq!(sanitize_name("a:b*c?.txt").as_deref(), Some("abc.txt"));
        assert_eq!(sanitize_name(".hidden").as_deref(), Some("hidden"));
    }

    #[test]
    fn test_sanitize_windows_device_names() {
        assert_eq!(sanitize_name("con").as_deref(), Some("_con"));
        assert_eq!(sanitize_name("NUL.txt").as_deref(), Some("_NUL.txt"));
        assert_eq!(sanitize_name("console.txt").as_deref(), Some("console.txt"));
    }

    #[test]
    fn test_allowed_extension() {
        let allowed = vec!["pdf".to_string(), "jpg".to_string()];
        assert!(has_allowed_extension("a.pdf", &allowed));
        assert!(has_allowed_extension("A.JPG", &allowed));
        assert!(has_allowed_extension("x.tar.pdf", &allowed));
        assert!(!has_allowed_extension("a.exe", &allowed));
        assert!(!has_allowed_extension("pdf", &allowed));
        assert!(!has_allowed_extension("a.", &allowed));
    }
}
