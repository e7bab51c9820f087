//! 블랙리스트 필터, 병합, 원자적 설치
//!
//! 소스의 모든 구성 룰 파일을 이름 순서대로 이어 붙여 소스당 하나의 마스터 룰 파일을 만듭니다.
//! 블랙리스트는 파일 이름별 부분 문자열 목록이며, 해당 파일의 줄에만 적용됩니다.
//!
//! 설치는 같은 디렉토리의 임시 파일에 쓴 뒤 rename으로 교체하므로,
//! 센서는 이전 내용 또는 새 내용 중 하나만 보게 됩니다.
//! 파일 수정 시각은 설치된 버전을 나타내며 [`stamp_installed`]로 나중에 다시 맞출 수 있습니다.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::RulesetError;
use crate::feed::RuleFile;
use crate::version::RulesetVersion;

/// 구성 파일 사이의 구분 (빈 줄 두 개)
const FILE_SPACER: &str = "\n\n";

/// 파일 이름별 제외 부분 문자열 목록
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blacklist {
    entries: BTreeMap<String, Vec<String>>,
}

impl Blacklist {
    /// 파일 이름 → 부분 문자열 목록으로 생성합니다. 빈 문자열 항목은 무시합니다.
    pub fn new(entries: BTreeMap<String, Vec<String>>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(file, subs)| (file, subs.into_iter().filter(|s| !s.is_empty()).collect()))
            .collect();
        Self { entries }
    }

    /// `file`의 `line`을 제외해야 하는지 확인합니다.
    pub fn rejects(&self, file: &str, line: &str) -> bool {
        self.entries
            .get(file)
            .is_some_and(|subs: &Vec<String>| subs.iter().any(|s| line.contains(s.as_str())))
    }

    /// 항목이 하나도 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }
}

/// 병합 결과 요약
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// 구성 파일 수
    pub files: usize,
    /// 받아들인 룰 수 (주석/빈 줄 제외)
    pub rules: usize,
    /// 블랙리스트로 제외된 줄 수
    pub rejected: usize,
}

/// 구성 파일들을 블랙리스트로 거르며 하나의 내용으로 합칩니다.
pub fn merge(files: &[RuleFile], blacklist: &Blacklist) -> (String, MergeSummary) {
    let mut content = String::new();
    let mut summary = MergeSummary {
        files: files.len(),
        ..Default::default()
    };

    for (i, file) in files.iter().enumerate() {
        if i > 0 {
            content.push_str(FILE_SPACER);
        }
        for line in file.content.lines() {
            if blacklist.rejects(&file.name, line) {
                summary.rejected += 1;
                continue;
            }
            let trimmed = line.trim_start();
            if !trimmed.is_empty() && !trimmed.starts_with('#') {
                summary.rules += 1;
            }
            content.push_str(line);
            content.push('\n');
        }
    }
    (content, summary)
}

/// `dir/file_name`을 `content`로 원자적으로 교체하고 수정 시각을 `version`으로 맞춥니다.
///
/// 블로킹 I/O입니다. 비동기 코드에서는 `spawn_blocking`으로 호출합니다.
pub fn install_atomic(
    dir: &Path,
    file_name: &str,
    content: &str,
    version: RulesetVersion,
) -> Result<PathBuf, RulesetError> {
    let target = dir.join(file_name);
    let fail = |reason: String| RulesetError::Install {
        path: target.display().to_string(),
        reason,
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".frosty-")
        .suffix(".rules.tmp")
        .tempfile_in(dir)
        .map_err(|e| fail(e.to_string()))?;
    tmp.write_all(content.as_bytes())
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| fail(e.to_string()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))
            .map_err(|e| fail(e.to_string()))?;
    }

    let file = tmp.persist(&target).map_err(|e| fail(e.error.to_string()))?;
    file.set_modified(version.to_system_time())
        .map_err(|e| fail(format!("set mtime: {e}")))?;
    Ok(target)
}

/// 설치된 파일의 수정 시각을 `version`으로 맞춥니다. 내용은 바꾸지 않습니다.
pub fn stamp_installed(path: &Path, version: RulesetVersion) -> Result<(), RulesetError> {
    std::fs::File::options()
        .write(true)
        .open(path)
        .and_then(|file| file.set_modified(version.to_system_time()))
        .map_err(|e| RulesetError::Install {
            path: path.display().to_string(),
            reason: format!("set mtime: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule_file(name: &str, content: &str) -> RuleFile {
        RuleFile {
            name: name.to_owned(),
            content: content.to_owned(),
        }
    }

    fn blacklist(file: &str, subs: &[&str]) -> Blacklist {
        let mut entries = BTreeMap::new();
        entries.insert(
            file.to_owned(),
            subs.iter().map(|s| (*s).to_owned()).collect(),
        );
        Blacklist::new(entries)
    }

    #[test]
    fn blacklist_is_scoped_to_its_file() {
        let files = vec![
            rule_file(
                "foo.rules",
                "alert tcp any any -> any any (msg:\"superuser login\"; sid:1;)\n\
                 alert tcp any any -> any any (msg:\"ok\"; sid:2;)\n",
            ),
            rule_file(
                "bar.rules",
                "alert tcp any any -> any any (msg:\"superuser elsewhere\"; sid:3;)\n",
            ),
        ];
        let (content, summary) = merge(&files, &blacklist("foo.rules", &["superuser"]));

        assert!(!content.contains("sid:1;"));
        assert!(content.contains("sid:2;"));
        assert!(content.contains("superuser elsewhere"));
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.rules, 2);
        assert_eq!(summary.files, 2);
    }

    #[test]
    fn blacklist_matches_comment_lines_too() {
        let files = vec![rule_file("foo.rules", "# superuser notes\nalert ip any any -> any any (sid:9;)\n")];
        let (content, summary) = merge(&files, &blacklist("foo.rules", &["superuser"]));
        assert_eq!(content, "alert ip any any -> any any (sid:9;)\n");
        assert_eq!(summary.rejected, 1);
    }

    #[test]
    fn files_are_separated_by_blank_lines() {
        let files = vec![rule_file("a.rules", "A"), rule_file("b.rules", "B\n")];
        let (content, _) = merge(&files, &Blacklist::default());
        assert_eq!(content, "A\n\n\nB\n");
    }

    #[test]
    fn empty_entries_never_match() {
        let list = blacklist("foo.rules", &[""]);
        assert!(list.is_empty());
        assert!(!list.rejects("foo.rules", "anything"));
    }

    #[test]
    fn install_replaces_content_and_sets_mtime() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("et.rules"), "old\n").unwrap();

        let version = RulesetVersion::parse_http_date("Wed, 03 Jan 2024 08:00:00 GMT").unwrap();
        let path = install_atomic(dir.path(), "et.rules", "new\n", version).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new\n");
        assert_eq!(RulesetVersion::of_installed(&path), version);

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn restamp_keeps_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = install_atomic(dir.path(), "et.rules", "alert\n", RulesetVersion::EPOCH).unwrap();
        assert_eq!(RulesetVersion::of_installed(&path), RulesetVersion::EPOCH);

        let version = RulesetVersion::parse_http_date("Thu, 04 Jan 2024 09:00:00 GMT").unwrap();
        stamp_installed(&path, version).unwrap();
        assert_eq!(RulesetVersion::of_installed(&path), version);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "alert\n");

        assert!(stamp_installed(&dir.path().join("absent.rules"), version).is_err());
    }

    #[test]
    fn install_into_missing_dir_fails() {
        let err = install_atomic(
            Path::new("/nonexistent/frosty/rules"),
            "et.rules",
            "x",
            RulesetVersion::EPOCH,
        )
        .unwrap_err();
        assert!(matches!(err, RulesetError::Install { .. }));
    }
}
