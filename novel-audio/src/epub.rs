//! EPUB 3 packaging of chapter text files.

use anyhow::{Context, Result};
use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::project::chapter_files;
use crate::text::split_title;

/// Optional reading order written by the scraper, `[{"file": "..."}, ...]`.
pub const ORDER_FILE: &str = "chapters.json";

const STYLESHEET: &str = "body { margin: 5%; font-size: 1.1em; line-height: 1.6; }
h1 { text-align: center; margin-top: 2em; margin-bottom: 1em; font-weight: bold; }
p { text-indent: 1.5em; margin-bottom: 0.5em; text-align: justify; }
";

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookMetadata {
    pub title: String,
    pub author: Option<String>,
    pub language: String,
}

impl BookMetadata {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: None,
            language: "en".to_string(),
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Stable identifier derived from title and author.
    pub fn identifier(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.title.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.author.as_deref().unwrap_or_default().as_bytes());
        format!("urn:novel-audio:{}", &format!("{:x}", hasher.finalize())[..32])
    }
}

/// A chapter ready for packaging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpubChapter {
    pub title: String,
    pub body: String,
}

impl EpubChapter {
    /// First line is the title, the rest the body.
    pub fn from_text(text: &str) -> Option<Self> {
        let (title, body) = split_title(text);
        if title.is_empty() {
            return None;
        }
        Some(Self {
            title: title.to_string(),
            body: body.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct OrderEntry {
    #[serde(default)]
    file: Option<String>,
}

/// Chapter files of `dir` in reading order.
///
/// Uses `chapters.json` when present and non-empty, file-name order otherwise.
fn ordered_chapter_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let order_path = dir.join(ORDER_FILE);
    if order_path.exists() {
        let parsed = fs::read_to_string(&order_path)
            .map_err(anyhow::Error::from)
            .and_then(|raw| Ok(serde_json::from_str::<Vec<OrderEntry>>(&raw)?));
        match parsed {
            Ok(entries) => {
                let files: Vec<PathBuf> = entries
                    .into_iter()
                    .filter_map(|e| e.file)
                    .map(|f| dir.join(f))
                    .collect();
                if !files.is_empty() {
                    return Ok(files);
                }
            }
            Err(e) => log::warn!("Ignoring {}: {}", order_path.display(), e),
        }
    }
    chapter_files(dir)
}

/// Read every chapter of `dir`, skipping empty and missing files.
pub fn load_chapters(dir: &Path) -> Result<Vec<EpubChapter>> {
    let mut chapters = Vec::new();
    for path in ordered_chapter_files(dir)? {
        if !path.exists() {
            log::warn!("Skipping missing chapter file {}", path.display());
            continue;
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        match EpubChapter::from_text(&text) {
            Some(chapter) => chapters.push(chapter),
            None => log::warn!("Skipping empty chapter {}", path.display()),
        }
    }
    Ok(chapters)
}

pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

static PARAGRAPH_BREAK: OnceLock<Regex> = OnceLock::new();

/// Body text as `<p>` elements; single line breaks become `<br />`.
fn paragraphs_html(body: &str) -> String {
    let re = PARAGRAPH_BREAK.get_or_init(|| Regex::new(r"\n\s*\n").expect("static regex is valid"));
    let body = body.replace("\r\n", "\n");
    re.split(body.trim())
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| format!("<p>{}</p>", escape_xml(p).replace('\n', "<br />\n")))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn chapter_xhtml(chapter: &EpubChapter, language: &str) -> String {
    let title = escape_xml(&chapter.title);
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" lang="{lang}" xml:lang="{lang}">
<head>
  <title>{title}</title>
  <link rel="stylesheet" type="text/css" href="style/default.css"/>
</head>
<body>
<h1>{title}</h1>
{body}
</body>
</html>
"#,
        lang = escape_xml(language),
        title = title,
        body = paragraphs_html(&chapter.body),
    )
}

fn chapter_file_name(index: usize) -> String {
    format!("chapter_{:04}.xhtml", index + 1)
}

/// File name and media type of a cover image, sniffed from its first bytes.
fn cover_kind(data: &[u8]) -> (&'static str, &'static str) {
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        ("cover.png", "image/png")
    } else if data.starts_with(b"GIF") {
        ("cover.gif", "image/gif")
    } else if data.starts_with(b"RIFF") && data.len() > 12 && &data[8..12] == b"WEBP" {
        ("cover.webp", "image/webp")
    } else {
        ("cover.jpg", "image/jpeg")
    }
}

fn content_opf(
    meta: &BookMetadata,
    chapters: &[EpubChapter],
    cover: Option<(&str, &str)>,
) -> String {
    let mut manifest = String::from(
        "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\n\
         \x20   <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\"/>\n\
         \x20   <item id=\"style_default\" href=\"style/default.css\" media-type=\"text/css\"/>\n",
    );
    if let Some((file, media_type)) = cover {
        manifest.push_str(&format!(
            "    <item id=\"cover-image\" href=\"{}\" media-type=\"{}\" properties=\"cover-image\"/>\n",
            file, media_type
        ));
    }
    let mut spine = String::from("    <itemref idref=\"nav\"/>\n");
    for index in 0..chapters.len() {
        let id = format!("chapter_{:04}", index + 1);
        manifest.push_str(&format!(
            "    <item id=\"{}\" href=\"{}\" media-type=\"application/xhtml+xml\"/>\n",
            id,
            chapter_file_name(index)
        ));
        spine.push_str(&format!("    <itemref idref=\"{}\"/>\n", id));
    }

    let creator = meta
        .author
        .as_deref()
        .map(|a| format!("    <dc:creator>{}</dc:creator>\n", escape_xml(a)))
        .unwrap_or_default();
    let cover_meta = if cover.is_some() {
        "    <meta name=\"cover\" content=\"cover-image\"/>\n"
    } else {
        ""
    };

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="book-id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="book-id">{id}</dc:identifier>
    <dc:title>{title}</dc:title>
    <dc:language>{lang}</dc:language>
{creator}    <meta property="dcterms:modified">{modified}</meta>
{cover_meta}  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine toc="ncx">
{spine}  </spine>
</package>
"#,
        id = escape_xml(&meta.identifier()),
        title = escape_xml(&meta.title),
        lang = escape_xml(&meta.language),
        creator = creator,
        modified = Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
        cover_meta = cover_meta,
        manifest = manifest,
        spine = spine,
    )
}

fn nav_xhtml(meta: &BookMetadata, chapters: &[EpubChapter]) -> String {
    let items: String = chapters
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "      <li><a href=\"{}\">{}</a></li>\n",
                chapter_file_name(i),
                escape_xml(&c.title)
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head>
  <title>{title}</title>
</head>
<body>
  <nav epub:type="toc" id="toc">
    <h1>{title}</h1>
    <ol>
{items}    </ol>
  </nav>
</body>
</html>
"#,
        title = escape_xml(&meta.title),
        items = items,
    )
}

fn toc_ncx(meta: &BookMetadata, chapters: &[EpubChapter]) -> String {
    let points: String = chapters
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "    <navPoint id=\"chapter_{n:04}\" playOrder=\"{n}\">\n\
                 \x20     <navLabel><text>{title}</text></navLabel>\n\
                 \x20     <content src=\"{src}\"/>\n\
                 \x20   </navPoint>\n",
                n = i + 1,
                title = escape_xml(&c.title),
                src = chapter_file_name(i),
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content="{id}"/>
  </head>
  <docTitle><text>{title}</text></docTitle>
  <navMap>
{points}  </navMap>
</ncx>
"#,
        id = escape_xml(&meta.identifier()),
        title = escape_xml(&meta.title),
        points = points,
    )
}

/// Write an EPUB with the given chapters to `output`.
pub fn write_epub(
    chapters: &[EpubChapter],
    meta: &BookMetadata,
    cover_image: Option<&Path>,
    output: &Path,
) -> Result<()> {
    if chapters.is_empty() {
        anyhow::bail!("No chapters to package");
    }

    let cover = match cover_image {
        Some(path) if path.exists() => Some(
            fs::read(path).with_context(|| format!("Failed to read cover {}", path.display()))?,
        ),
        Some(path) => {
            log::warn!("Cover image {} not found, leaving it out", path.display());
            None
        }
        None => None,
    };
    let cover_entry = cover.as_deref().map(cover_kind);

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(output).with_context(|| format!("Failed to create {}", output.display()))?;
    let mut zip = ZipWriter::new(file);
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    // mimetype must be the first entry and uncompressed
    zip.start_file("mimetype", stored)?;
    zip.write_all(b"application/epub+zip")?;

    zip.start_file("META-INF/container.xml", deflated)?;
    zip.write_all(CONTAINER_XML.as_bytes())?;

    zip.start_file("OEBPS/content.opf", deflated)?;
    zip.write_all(content_opf(meta, chapters, cover_entry).as_bytes())?;

    zip.start_file("OEBPS/nav.xhtml", deflated)?;
    zip.write_all(nav_xhtml(meta, chapters).as_bytes())?;

    zip.start_file("OEBPS/toc.ncx", deflated)?;
    zip.write_all(toc_ncx(meta, chapters).as_bytes())?;

    zip.start_file("OEBPS/style/default.css", deflated)?;
    zip.write_all(STYLESHEET.as_bytes())?;

    for (index, chapter) in chapters.iter().enumerate() {
        zip.start_file(format!("OEBPS/{}", chapter_file_name(index)), deflated)?;
        zip.write_all(chapter_xhtml(chapter, &meta.language).as_bytes())?;
    }

    if let (Some(data), Some((name, _))) = (&cover, cover_entry) {
        zip.start_file(format!("OEBPS/{}", name), stored)?;
        zip.write_all(data)?;
    }

    zip.finish()?;
    log::info!("Wrote {} ({} chapters)", output.display(), chapters.len());
    Ok(())
}
