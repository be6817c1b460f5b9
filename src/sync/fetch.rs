use anyhow::Result;
use bytes::Bytes;
use reqwest::Client;

pub async fn fetch_feed(client: &Client, url: &str) -> Result<Bytes> {
    let bytes = client.get(url).send().await?.error_for_status()?.bytes().await?;
    Ok(bytes)
}

pub async fn fetch_page(client: &Client, url: &str) -> Result<String> {
    let text = client.get(url).send().await?.error_for_status()?.text().await?;
    Ok(text)
}

pub async fn fetch_bytes(client: &Client, url: &str) -> Result<Bytes> {
    let bytes = client.get(url).send().await?.error_for_status()?.bytes().await?;
    Ok(bytes)
}
