use std::path::PathBuf;

pub fn absolute_path(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        let env = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        env.join(path)
    }
}

/// Replaces characters that are unsafe in a directory name with underscores.
pub fn sanitize_dir_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::sanitize_dir_name;

    #[test]
    fn sanitize_keeps_safe_characters() {
        assert_eq!(sanitize_dir_name("my-job_01"), "my-job_01");
    }

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_dir_name("my job/№1"), "my_job__1");
    }
}
