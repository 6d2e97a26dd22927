//! User-facing chat texts.

use crate::jobs::{Artifact, JobId, MediaKind, ARTIFACT_TTL_DAYS};

pub fn usage_hint() -> String {
    "❌ URLが見つかりませんでした。URLを含めてメンションしてください。\n例: `@bot https://example.com/article`"
        .to_string()
}

pub fn acknowledgement(url: &str, job_id: JobId) -> String {
    format!(
        "✅ URLを受け付けました: {}\n\n🔄 処理キューに追加しました (Job ID: {})\n処理が完了したらこのスレッドに結果を投稿します。",
        url, job_id
    )
}

pub fn completion(artifacts: &[Artifact]) -> String {
    let mut message = String::from("✅ 処理が完了しました！\n\n");

    for kind in MediaKind::ALL {
        if let Some(artifact) = artifacts.iter().find(|a| a.kind == kind) {
            let label = match kind {
                MediaKind::Audio => "🎵 音声解説",
                MediaKind::Video => "🎬 動画解説",
            };
            message.push_str(&format!("{}: {}\n", label, artifact.public_url));
            message.push_str(&format!("   サイズ: {} MB\n\n", artifact.size_mb()));
        }
    }

    message.push_str(&format!("⏰ リンクは{}日間有効です", ARTIFACT_TTL_DAYS));
    message
}

/// Deliberately generic; details stay in the logs.
pub fn failure() -> String {
    "❌ 処理中にエラーが発生しました。後でもう一度お試しください。".to_string()
}

pub fn intake_error() -> String {
    "❌ エラーが発生しました。後でもう一度お試しください。".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn artifact(kind: MediaKind, bytes: u64) -> Artifact {
        Artifact {
            id: 1,
            job_id: 9,
            kind,
            filename: kind.filename_for(9),
            storage_key: format!("media/1-{}", kind.filename_for(9)),
            public_url: format!("https://media.example.com/{}", kind.filename_for(9)),
            byte_size: bytes,
            expires_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_completion_lists_both_links() {
        let text = completion(&[
            artifact(MediaKind::Video, 3 * 1024 * 1024),
            artifact(MediaKind::Audio, 1_572_864),
        ]);

        let audio = text.find("音声解説").unwrap();
        let video = text.find("動画解説").unwrap();
        assert!(audio < video);
        assert!(text.contains("https://media.example.com/audio-9.m4a"));
        assert!(text.contains("サイズ: 1.50 MB"));
        assert!(text.contains("サイズ: 3.00 MB"));
        assert!(text.ends_with("リンクは7日間有効です"));
    }

    #[test]
    fn test_acknowledgement_names_job() {
        let text = acknowledgement("https://example.com/a", 42);
        assert!(text.contains("Job ID: 42"));
        assert!(text.contains("https://example.com/a"));
    }

    #[test]
    fn test_failure_is_generic() {
        assert!(!failure().contains("Step"));
    }
}
