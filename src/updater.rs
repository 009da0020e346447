use crate::errors::Result;
use log::{info, warn};
use serde::Deserialize;

const RELEASES_URL: &str = "https://api.github.com/repos/EgoStrategy/OptionsHub/releases";
const DOWNLOAD_PAGE: &str = "https://github.com/EgoStrategy/OptionsHub/releases/latest";

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
}

/// 启动时检查是否有新版本，只提示不强制
///
/// 检查失败不影响正常运行。
pub async fn check_for_updates() {
    info!("Checking for updates...");
    match latest_release().await {
        Ok(Some(version)) => {
            info!("发现新版本 {}，可在 {} 下载", version, DOWNLOAD_PAGE);
        }
        Ok(None) => info!("No update found"),
        Err(e) => warn!("Update check failed: {}", e),
    }
}

async fn latest_release() -> Result<Option<String>> {
    // GitHub API要求带UA
    let client = reqwest::Client::builder()
        .user_agent(concat!("optionshub/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let releases: Vec<Release> = client.get(RELEASES_URL).send().await?.json().await?;
    let tags: Vec<&str> = releases.iter().map(|r| r.tag_name.as_str()).collect();
    Ok(newer_version(env!("CARGO_PKG_VERSION"), &tags))
}

/// 从发布标签中找出比当前版本新的最新版本
fn newer_version(current: &str, tags: &[&str]) -> Option<String> {
    let mut versions: Vec<&str> = tags
        .iter()
        .map(|tag| tag.trim_start_matches('v'))
        .collect();
    versions.sort_unstable();

    match versions.last() {
        Some(latest) if *latest > current => Some(latest.to_string()),
        _ => None,
    }
}
