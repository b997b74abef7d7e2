use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use docrag_core::chunker::ChunkingConfig;
use docrag_core::data_processor::{relative_source, DataProcessor};
use docrag_core::extract::{docx_xml_to_text, extract_text, html_to_text, DocumentKind};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = fs::File::create(path).unwrap();
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, bytes) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
}

fn write_docx(path: &Path, paragraphs: &[&str]) {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>", p))
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
        body
    );
    write_zip(path, &[("word/document.xml", xml.as_bytes())]);
}

/// Minimal PDF with one Courier text line per page.
fn write_pdf(path: &Path, pages: &[&str]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }
    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Count" => kids.len() as i64,
        "Kids" => kids,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

#[test]
fn process_directory_single_small_file() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    let mut f = fs::File::create(dir.join("a.txt")).unwrap();
    writeln!(f, "Short text").unwrap();

    let chunks = DataProcessor::new().process_path(dir).expect("process");

    assert_eq!(chunks.len(), 1, "one small document becomes one chunk");
    assert_eq!(chunks[0].text, "Short text");
    assert_eq!(chunks[0].source, "a.txt");
    assert_eq!(chunks[0].chunk_index, 0);
    assert_eq!(chunks[0].id, "a.txt:0");
}

#[test]
fn process_directory_mixed_formats() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::create_dir_all(dir.join("sub")).unwrap();
    fs::write(dir.join("a.txt"), "Plain text document.").unwrap();
    fs::write(
        dir.join("sub/b.html"),
        "<html><head><style>body{color:red}</style><script>var hidden = 1;</script></head>\
         <body><h1>Title</h1><p>Visible paragraph.</p><noscript>enable js</noscript></body></html>",
    )
    .unwrap();
    write_docx(&dir.join("c.docx"), &["First paragraph.", "Second &amp; last."]);
    fs::write(dir.join("d.pdf"), b"%PDF-1.4 not really").unwrap();
    fs::write(dir.join("e.bin"), [0u8, 1, 2]).unwrap();

    let chunks = DataProcessor::new().process_path(dir).expect("process");
    let sources: Vec<&str> = chunks.iter().map(|c| c.source.as_str()).collect();
    assert_eq!(sources, vec!["a.txt", "c.docx", "sub/b.html"], "sorted, broken pdf and bin skipped");

    let html = &chunks[2].text;
    assert!(html.contains("Title"));
    assert!(html.contains("Visible paragraph."));
    assert!(!html.contains("hidden"));
    assert!(!html.contains("color:red"));
    assert!(!html.contains("enable js"));

    assert_eq!(chunks[1].text, "First paragraph. Second & last.");
}

#[test]
fn zip_sources_are_relative_to_archive_root() {
    let tmp = TempDir::new().unwrap();
    let zip_path = tmp.path().join("docs.zip");
    write_zip(
        &zip_path,
        &[
            ("docs/x.txt", b"Alpha document body."),
            ("docs/nested/y.htm", b"<p>Beta document body.</p>"),
            ("docs/readme.rtf", b"ignored"),
        ],
    );

    let chunks = DataProcessor::new().process_path(&zip_path).expect("zip ingest");
    let sources: Vec<&str> = chunks.iter().map(|c| c.source.as_str()).collect();
    assert_eq!(sources, vec!["docs/nested/y.htm", "docs/x.txt"]);
    assert_eq!(chunks[1].text, "Alpha document body.");
}

#[test]
fn long_document_gets_sequential_chunk_indices() {
    let tmp = TempDir::new().unwrap();
    let text = "Sentence number one is here. ".repeat(40);
    fs::write(tmp.path().join("long.txt"), &text).unwrap();
    fs::write(tmp.path().join("short.txt"), "Tiny.").unwrap();

    let processor = DataProcessor::with_chunking(ChunkingConfig { max_chunk_size: 100, overlap: 20 });
    let chunks = processor.process_path(tmp.path()).expect("process");

    let long: Vec<_> = chunks.iter().filter(|c| c.source == "long.txt").collect();
    assert!(long.len() > 1);
    for (i, c) in long.iter().enumerate() {
        assert_eq!(c.chunk_index, i);
        assert!(c.text.chars().count() <= 100);
    }
    let ids: HashSet<_> = chunks.iter().map(|c| c.id.clone()).collect();
    assert_eq!(ids.len(), chunks.len(), "ids are unique");
}

#[test]
fn process_path_limited_two_files_limit_one() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("a.txt"), "alpha bravo").unwrap();
    fs::write(dir.join("b.txt"), "charlie delta").unwrap();

    let chunks = DataProcessor::new().process_path_limited(dir, 1).expect("process limited");

    let sources: HashSet<_> = chunks.iter().map(|c| c.source.clone()).collect();
    assert_eq!(sources.len(), 1, "limited to one source document");
}

#[test]
fn empty_documents_and_directories_yield_nothing() {
    let tmp = TempDir::new().unwrap();
    assert!(DataProcessor::new().process_path(tmp.path()).unwrap().is_empty());

    fs::write(tmp.path().join("blank.txt"), "   \n\n ").unwrap();
    assert!(DataProcessor::new().process_path(tmp.path()).unwrap().is_empty());
}

#[test]
fn missing_path_is_an_error() {
    let tmp = TempDir::new().unwrap();
    assert!(DataProcessor::new().process_path(&tmp.path().join("nope")).is_err());
}

#[test]
fn document_kinds_follow_extensions() {
    assert_eq!(DocumentKind::from_path(Path::new("a/B.HTML")), Some(DocumentKind::Html));
    assert_eq!(DocumentKind::from_path(Path::new("notes.md")), Some(DocumentKind::Text));
    assert_eq!(DocumentKind::from_path(Path::new("x.docx")), Some(DocumentKind::Docx));
    assert_eq!(DocumentKind::from_path(Path::new("x.pdf")), Some(DocumentKind::Pdf));
    assert_eq!(DocumentKind::from_path(Path::new("x.xlsx")), None);
    assert_eq!(DocumentKind::from_path(Path::new("Makefile")), None);
}

#[test]
fn docx_runs_and_entities_are_decoded() {
    let xml = "<w:body><w:p><w:r><w:t>Fish &lt;&amp;&gt; chips</w:t></w:r><w:r><w:tab/><w:t xml:space=\"preserve\"> &#233;t&#xE9;</w:t></w:r></w:p>\
               <w:tbl><w:tr><w:tc><w:p><w:r><w:t>cell</w:t></w:r></w:p></w:tc></w:tr></w:tbl></w:body>";
    let text = docx_xml_to_text(xml).unwrap();
    assert_eq!(text, "Fish <&> chips\t été\ncell\n");
}

#[test]
fn self_closing_text_run_is_empty() {
    let xml = "<w:body><w:p><w:r><w:t xml:space=\"preserve\"/></w:r><w:r><w:t>Hello</w:t></w:r></w:p></w:body>";
    assert_eq!(docx_xml_to_text(xml).unwrap(), "Hello\n");
}

#[test]
fn tab_stops_outside_runs_are_ignored() {
    let xml = "<w:p><w:pPr><w:tabs><w:tab w:val=\"left\" w:pos=\"720\"/></w:tabs></w:pPr>\
               <w:r><w:t>a</w:t><w:br/><w:t>b</w:t></w:r></w:p><w:p/>";
    assert_eq!(docx_xml_to_text(xml).unwrap(), "a\nb\n\n");
}

#[test]
fn pdf_pages_are_joined_with_blank_lines() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("manual.pdf");
    write_pdf(&path, &["Page one text", "Page two text"]);

    let text = extract_text(&path).expect("pdf text");
    let first = text.find("Page one text").expect("first page");
    let second = text.find("Page two text").expect("second page");
    assert!(first < second);
    assert!(text[first..second].contains("\n\n"));
}

#[test]
fn zip_of_pdfs_is_ingested() {
    let tmp = TempDir::new().unwrap();
    let pdf_path = tmp.path().join("guide.pdf");
    write_pdf(&pdf_path, &["Solar panels face south"]);
    let zip_path = tmp.path().join("pdfs.zip");
    write_zip(&zip_path, &[("pdfs/guide.pdf", &fs::read(&pdf_path).unwrap())]);

    let chunks = DataProcessor::new().process_path(&zip_path).expect("zip ingest");
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].source, "pdfs/guide.pdf");
    assert!(chunks[0].text.contains("Solar panels face south"));
}

#[test]
fn non_utf8_text_is_read_lossily() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("latin1.txt");
    fs::write(&path, b"caf\xe9 au lait").unwrap();
    assert_eq!(extract_text(&path).unwrap(), "caf\u{FFFD} au lait");
}

#[test]
fn html_text_skips_scripts() {
    let text = html_to_text("<div>keep<script>drop()</script><span>also</span></div>");
    assert!(text.contains("keep"));
    assert!(text.contains("also"));
    assert!(!text.contains("drop"));
}

#[test]
fn relative_source_uses_forward_slashes() {
    let root = Path::new("/data/root");
    assert_eq!(relative_source(&root.join("a").join("b.txt"), root), "a/b.txt");
}
