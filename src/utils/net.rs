// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use async_trait::async_trait;
use futures::{StreamExt as _, TryStreamExt as _};
use reqwest::header::ACCEPT;
use std::io;
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::requester::{ChunkStream, HttpClient};

pub fn global_http_client() -> reqwest::Client {
    static CLIENT: LazyLock<reqwest::Client> = LazyLock::new(reqwest::Client::new);
    CLIENT.clone()
}

fn transport_error(e: reqwest::Error) -> Error {
    Error::Transport(io::Error::other(e))
}

#[async_trait]
impl HttpClient for reqwest::Client {
    async fn get(&self, url: &Url, accept: &str) -> Result<ChunkStream, Error> {
        let response = reqwest::Client::get(self, url.clone())
            .header(ACCEPT, accept)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        debug!(%status, content_length = ?response.content_length(), "gateway responded");
        if !status.is_success() {
            return Err(Error::HttpStatus(status.as_u16()));
        }
        Ok(response.bytes_stream().map_err(io::Error::other).boxed())
    }
}
