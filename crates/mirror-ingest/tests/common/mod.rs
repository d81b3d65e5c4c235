//! Shared fixtures for mirror-ingest integration tests
//!
//! Exports are written as plain CSV in a [`TempDir`]; images are generated
//! PNGs; every remote collaborator (static host, metadata API, index) is a
//! path on one `wiremock` server.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use image::{DynamicImage, Rgb, RgbImage};
use mirror_common::ItemId;
use std::collections::HashSet;
use std::io::Cursor;
use std::path::PathBuf;
use tempfile::TempDir;
use wiremock::{Request, Respond, ResponseTemplate};

pub const EXPORT_HEADER: &str = "id,uploader_id,created_at,md5,source,rating,image_width,image_height,tag_string,locked_tags,fav_count,file_ext,parent_id,change_seq,approver_id,file_size,comment_count,description,duration,updated_at,is_deleted,is_pending,is_flagged,score,up_score,down_score,is_rating_locked,is_status_locked,is_note_locked";

/// One export row as (id, ext, deleted)
pub struct Row<'a> {
    pub id: &'a str,
    pub ext: &'a str,
    pub deleted: bool,
}

pub fn row<'a>(id: &'a str, ext: &'a str, deleted: bool) -> Row<'a> {
    Row { id, ext, deleted }
}

/// Deterministic md5-like hash for an identifier
pub fn md5_for(id: &str) -> String {
    format!("{:0>32}", format!("a{}", id))
}

pub fn export_csv(rows: &[Row<'_>]) -> String {
    let mut out = String::from(EXPORT_HEADER);
    out.push('\n');
    for r in rows {
        out.push_str(&format!(
            "{},7,2023-05-01 10:00:00,{},https://source.example,s,640,480,\"tag_a tag_b\",,12,{},,99,,123456,3,\"a, \"\"quoted\"\" description\",,2023-05-02 10:00:00,{},f,f,10,11,-1,f,f,f\n",
            r.id,
            md5_for(r.id),
            r.ext,
            if r.deleted { "t" } else { "f" }
        ));
    }
    out
}

pub fn write_export(dir: &TempDir, rows: &[Row<'_>]) -> PathBuf {
    let path = dir.path().join("posts-2024-01-01.csv");
    std::fs::write(&path, export_csv(rows)).unwrap();
    path
}

pub fn png_bytes(color: [u8; 3]) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 24, Rgb(color)))
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

pub fn ids(raw: &[&str]) -> HashSet<ItemId> {
    raw.iter().map(|id| ItemId::parse(*id).unwrap()).collect()
}

/// Identifiers listed in a `tags=id:1,2,3 status:any` query
pub fn requested_ids(request: &Request) -> Vec<String> {
    request
        .url
        .query_pairs()
        .find(|(key, _)| key == "tags")
        .map(|(_, tags)| {
            tags.split_whitespace()
                .find_map(|tag| tag.strip_prefix("id:"))
                .unwrap_or_default()
                .split(',')
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Metadata API stand-in answering every requested id, except `missing`,
/// with a preview under `<base>/deleted/`
pub struct PostsResponder {
    pub base_url: String,
    pub missing: HashSet<String>,
}

impl PostsResponder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            missing: HashSet::new(),
        }
    }

    pub fn without(mut self, id: &str) -> Self {
        self.missing.insert(id.to_string());
        self
    }
}

impl Respond for PostsResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let posts: Vec<_> = requested_ids(request)
            .into_iter()
            .filter(|id| !self.missing.contains(id))
            .map(|id| {
                serde_json::json!({
                    "id": id.parse::<u64>().unwrap(),
                    "file": { "md5": md5_for(&id) },
                    "preview": { "url": format!("{}/deleted/{}.jpg", self.base_url, id) }
                })
            })
            .collect();
        ResponseTemplate::new(200).set_body_json(serde_json::json!({ "posts": posts }))
    }
}
