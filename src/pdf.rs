use crate::assets::RasterImage;
use crate::canvas::{Command, Document, Page};
use crate::error::LabelError;
use crate::font::{DEFAULT_FONT, FontRegistry, RegisteredFont, is_base14};
use crate::types::{Color, Pt, Size};
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};
use std::io::{self, Write};

#[derive(Debug, Clone)]
pub struct PdfOptions {
    /// Flate-compress content, image and font streams.
    pub compress: bool,
    pub title: Option<String>,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            compress: true,
            title: None,
        }
    }
}

const PDF_CATALOG_ID: usize = 1;
const PDF_PAGES_ID: usize = 2;
const PDF_RESOURCES_ID: usize = 3;
const PDF_INFO_ID: usize = 4;
const PDF_FIRST_FREE_ID: usize = 5;

const PRODUCER: &str = "labelsheet";

enum FontProgram<'a> {
    Base14(String),
    Embedded(&'a RegisteredFont),
}

struct FontResource<'a> {
    resource: String,
    program: FontProgram<'a>,
}

/// Assembles one PDF from any number of recorded documents. Resources are
/// shared by every page through a single resource dictionary.
struct PdfBuilder<'a> {
    objects: BTreeMap<usize, Vec<u8>>,
    next_id: usize,
    options: &'a PdfOptions,
    registry: &'a FontRegistry,

    fonts: BTreeMap<String, FontResource<'a>>,
    images: HashMap<(u64, bool), String>,
    image_resources: Vec<(String, usize)>,
    gs_map: HashMap<(u16, u16), String>,
    gs_resources: Vec<(String, usize)>,
    page_ids: Vec<usize>,
}

impl<'a> PdfBuilder<'a> {
    fn new(registry: &'a FontRegistry, options: &'a PdfOptions) -> Self {
        Self {
            objects: BTreeMap::new(),
            next_id: PDF_FIRST_FREE_ID,
            options,
            registry,
            fonts: BTreeMap::new(),
            images: HashMap::new(),
            image_resources: Vec::new(),
            gs_map: HashMap::new(),
            gs_resources: Vec::new(),
            page_ids: Vec::new(),
        }
    }

    fn alloc_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn font_resource(&mut self, name: &str) -> String {
        if let Some(entry) = self.fonts.get(name) {
            return entry.resource.clone();
        }
        let program = if is_base14(name) {
            FontProgram::Base14(name.to_string())
        } else if let Some(font) = self.registry.resolve(name) {
            FontProgram::Embedded(font)
        } else {
            warn!("font \"{name}\" is not registered, substituting {DEFAULT_FONT}");
            FontProgram::Base14(DEFAULT_FONT.to_string())
        };
        let resource = format!("F{}", self.fonts.len() + 1);
        self.fonts.insert(
            name.to_string(),
            FontResource {
                resource: resource.clone(),
                program,
            },
        );
        resource
    }

    fn image_resource(&mut self, image: &RasterImage, alpha: bool) -> String {
        let key = (hash_image(image), alpha);
        if let Some(name) = self.images.get(&key) {
            return name.clone();
        }
        let name = format!("Im{}", self.image_resources.len() + 1);
        let smask_id = if alpha && image.has_alpha() {
            let id = self.alloc_id();
            let body = image_smask_object(image, self.options.compress);
            self.objects.insert(id, body);
            Some(id)
        } else {
            None
        };
        let id = self.alloc_id();
        self.objects
            .insert(id, image_object(image, smask_id, self.options.compress));
        self.image_resources.push((name.clone(), id));
        self.images.insert(key, name.clone());
        name
    }

    fn gs_resource(&mut self, fill: f32, stroke: f32) -> String {
        let key = (quantize_alpha(fill), quantize_alpha(stroke));
        if let Some(name) = self.gs_map.get(&key) {
            return name.clone();
        }
        let id = self.alloc_id();
        let name = format!("GS{}", self.gs_resources.len() + 1);
        let body = format!(
            "<< /Type /ExtGState /ca {} /CA {} >>",
            fmt(key.0 as f32 / 1000.0),
            fmt(key.1 as f32 / 1000.0)
        );
        self.objects.insert(id, body.into_bytes());
        self.gs_resources.push((name.clone(), id));
        self.gs_map.insert(key, name.clone());
        name
    }

    fn add_document(&mut self, document: &Document) {
        for page in &document.pages {
            self.add_page(page, document.page_size);
        }
    }

    fn add_page(&mut self, page: &Page, page_size: Size) {
        let content = self.render_page(page);
        let content_id = self.alloc_id();
        let page_id = self.alloc_id();
        self.objects.insert(
            content_id,
            stream_object("", content.as_bytes(), self.options.compress),
        );
        let page_obj = format!(
            "<< /Type /Page /Parent {} 0 R /MediaBox [0 0 {} {}] /Resources {} 0 R /Contents {} 0 R >>",
            PDF_PAGES_ID,
            fmt_pt(page_size.width),
            fmt_pt(page_size.height),
            PDF_RESOURCES_ID,
            content_id
        );
        self.objects.insert(page_id, page_obj.into_bytes());
        self.page_ids.push(page_id);
    }

    fn render_page(&mut self, page: &Page) -> String {
        let mut out = String::new();
        // Font selection follows q/Q like the rest of the graphics state.
        let mut font = (DEFAULT_FONT.to_string(), Pt::from_i32(12));
        let mut font_stack: Vec<(String, Pt)> = Vec::new();

        for cmd in &page.commands {
            match cmd {
                Command::SaveState => {
                    font_stack.push(font.clone());
                    out.push_str("q\n");
                }
                Command::RestoreState => {
                    if let Some(saved) = font_stack.pop() {
                        font = saved;
                    }
                    out.push_str("Q\n");
                }
                Command::Translate(x, y) => {
                    out.push_str(&format!("1 0 0 1 {} {} cm\n", fmt_pt(*x), fmt_pt(*y)));
                }
                Command::Scale(sx, sy) => {
                    out.push_str(&format!("{} 0 0 {} 0 0 cm\n", fmt(*sx), fmt(*sy)));
                }
                Command::Rotate(angle) => {
                    let (s, c) = libm::sincosf(*angle);
                    out.push_str(&format!(
                        "{} {} {} {} 0 0 cm\n",
                        fmt(c),
                        fmt(s),
                        fmt(-s),
                        fmt(c)
                    ));
                }
                Command::ConcatMatrix { a, b, c, d, e, f } => {
                    out.push_str(&format!(
                        "{} {} {} {} {} {} cm\n",
                        fmt(*a),
                        fmt(*b),
                        fmt(*c),
                        fmt(*d),
                        fmt_pt(*e),
                        fmt_pt(*f)
                    ));
                }
                Command::Meta { .. } => {}
                Command::SetFillColor(color) => out.push_str(&color_to_pdf_fill(*color)),
                Command::SetStrokeColor(color) => out.push_str(&color_to_pdf_stroke(*color)),
                Command::SetLineWidth(width) => {
                    out.push_str(&format!("{} w\n", fmt_pt(*width)));
                }
                Command::SetOpacity { fill, stroke } => {
                    let name = self.gs_resource(*fill, *stroke);
                    out.push_str(&format!("/{} gs\n", name));
                }
                Command::SetFontName(name) => font.0 = name.clone(),
                Command::SetFontSize(size) => font.1 = *size,
                Command::ClipPath { evenodd } => {
                    out.push_str(if *evenodd { "W* n\n" } else { "W n\n" });
                }
                Command::MoveTo { x, y } => {
                    out.push_str(&format!("{} {} m\n", fmt_pt(*x), fmt_pt(*y)));
                }
                Command::LineTo { x, y } => {
                    out.push_str(&format!("{} {} l\n", fmt_pt(*x), fmt_pt(*y)));
                }
                Command::ClosePath => out.push_str("h\n"),
                Command::Fill => out.push_str("f\n"),
                Command::Stroke => out.push_str("S\n"),
                Command::DrawString { x, y, text } => {
                    let resource = self.font_resource(&font.0);
                    let encoded = encode_winansi_pdf_string(text);
                    if encoded.replaced > 0 {
                        debug!(
                            "{} character(s) of \"{}\" are outside WinAnsi",
                            encoded.replaced, text
                        );
                    }
                    out.push_str(&format!(
                        "BT /{} {} Tf {} {} Td ({}) Tj ET\n",
                        resource,
                        fmt_pt(font.1),
                        fmt_pt(*x),
                        fmt_pt(*y),
                        encoded.text
                    ));
                }
                Command::DrawImage { image, alpha } => {
                    let name = self.image_resource(image, *alpha);
                    out.push_str(&format!("/{} Do\n", name));
                }
            }
        }
        out
    }

    fn write_fonts(&mut self) -> Vec<(String, usize)> {
        let fonts = std::mem::take(&mut self.fonts);
        let mut resources = Vec::new();
        for entry in fonts.values() {
            let font_id = match &entry.program {
                FontProgram::Base14(name) => {
                    let id = self.alloc_id();
                    self.objects.insert(id, font_object(name).into_bytes());
                    id
                }
                FontProgram::Embedded(font) => {
                    let file_id = self.alloc_id();
                    let descriptor_id = self.alloc_id();
                    let id = self.alloc_id();
                    self.objects
                        .insert(file_id, font_file_object(&font.data, self.options.compress));
                    self.objects
                        .insert(descriptor_id, font_descriptor_object(font, file_id).into_bytes());
                    self.objects
                        .insert(id, truetype_font_object(font, descriptor_id).into_bytes());
                    id
                }
            };
            resources.push((entry.resource.clone(), font_id));
        }
        self.fonts = fonts;
        resources
    }

    fn finish<W: Write>(mut self, writer: &mut W) -> io::Result<usize> {
        let fonts = self.write_fonts();

        let mut resources = String::from("<< /ProcSet [/PDF /Text /ImageB /ImageC]");
        if !fonts.is_empty() {
            resources.push_str(&format!(" /Font {}", resource_dict(&fonts)));
        }
        if !self.image_resources.is_empty() {
            resources.push_str(&format!(" /XObject {}", resource_dict(&self.image_resources)));
        }
        if !self.gs_resources.is_empty() {
            resources.push_str(&format!(" /ExtGState {}", resource_dict(&self.gs_resources)));
        }
        resources.push_str(" >>");
        self.objects.insert(PDF_RESOURCES_ID, resources.into_bytes());

        let kids = self
            .page_ids
            .iter()
            .map(|id| format!("{} 0 R", id))
            .collect::<Vec<_>>()
            .join(" ");
        self.objects.insert(
            PDF_PAGES_ID,
            format!(
                "<< /Type /Pages /Kids [{}] /Count {} >>",
                kids,
                self.page_ids.len()
            )
            .into_bytes(),
        );
        self.objects.insert(
            PDF_CATALOG_ID,
            format!("<< /Type /Catalog /Pages {} 0 R >>", PDF_PAGES_ID).into_bytes(),
        );
        self.objects.insert(
            PDF_INFO_ID,
            info_object(self.options.title.as_deref()).into_bytes(),
        );

        build_pdf(writer, &self.objects, self.next_id)
    }
}

/// Writes every page of `documents`, in order, into one PDF on `writer`.
/// Returns the number of bytes written.
pub fn write_pdf<W: Write>(
    documents: &[Document],
    fonts: &FontRegistry,
    options: &PdfOptions,
    writer: &mut W,
) -> Result<usize, LabelError> {
    let mut builder = PdfBuilder::new(fonts, options);
    for document in documents {
        builder.add_document(document);
    }
    let pages = builder.page_ids.len();
    let written = builder.finish(writer)?;
    debug!("wrote PDF: {pages} page(s), {written} bytes");
    Ok(written)
}

pub fn documents_to_pdf(
    documents: &[Document],
    fonts: &FontRegistry,
    options: &PdfOptions,
) -> Result<Vec<u8>, LabelError> {
    let mut out = Vec::new();
    write_pdf(documents, fonts, options, &mut out)?;
    Ok(out)
}

pub fn document_to_pdf(
    document: &Document,
    fonts: &FontRegistry,
    options: &PdfOptions,
) -> Result<Vec<u8>, LabelError> {
    documents_to_pdf(std::slice::from_ref(document), fonts, options)
}

fn build_pdf<W: Write>(
    writer: &mut W,
    objects: &BTreeMap<usize, Vec<u8>>,
    next_id: usize,
) -> io::Result<usize> {
    let mut offset = 0usize;
    let mut offsets = vec![0usize; next_id];
    write_bytes(writer, b"%PDF-1.7\n", &mut offset)?;
    write_bytes(writer, b"%\xE2\xE3\xCF\xD3\n", &mut offset)?;
    for (id, body) in objects {
        if let Some(slot) = offsets.get_mut(*id) {
            *slot = offset;
        }
        write_str(writer, &format!("{} 0 obj\n", id), &mut offset)?;
        write_bytes(writer, body, &mut offset)?;
        write_bytes(writer, b"\nendobj\n", &mut offset)?;
    }

    let xref_start = offset;
    write_str(writer, &format!("xref\n0 {}\n", next_id), &mut offset)?;
    write_bytes(writer, b"0000000000 65535 f \n", &mut offset)?;
    for id in 1..next_id {
        if objects.contains_key(&id) {
            write_str(writer, &format!("{:010} 00000 n \n", offsets[id]), &mut offset)?;
        } else {
            write_bytes(writer, b"0000000000 65535 f \n", &mut offset)?;
        }
    }
    write_str(
        writer,
        &format!(
            "trailer\n<< /Size {} /Root {} 0 R /Info {} 0 R >>\nstartxref\n{}\n%%EOF\n",
            next_id, PDF_CATALOG_ID, PDF_INFO_ID, xref_start
        ),
        &mut offset,
    )?;
    Ok(offset)
}

fn write_bytes<W: Write>(writer: &mut W, data: &[u8], offset: &mut usize) -> io::Result<()> {
    writer.write_all(data)?;
    *offset += data.len();
    Ok(())
}

fn write_str<W: Write>(writer: &mut W, data: &str, offset: &mut usize) -> io::Result<()> {
    write_bytes(writer, data.as_bytes(), offset)
}

fn stream_object(dict_entries: &str, data: &[u8], compress: bool) -> Vec<u8> {
    let (payload, filter) = if compress {
        (flate_compress(data), " /Filter /FlateDecode")
    } else {
        (data.to_vec(), "")
    };
    let mut out = format!(
        "<<{} /Length {}{} >>\nstream\n",
        dict_entries,
        payload.len(),
        filter
    )
    .into_bytes();
    out.extend_from_slice(&payload);
    out.extend_from_slice(b"\nendstream");
    out
}

fn flate_compress(data: &[u8]) -> Vec<u8> {
    use flate2::Compression;
    use flate2::write::ZlibEncoder;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    let _ = encoder.write_all(data);
    encoder.finish().unwrap_or_default()
}

fn hash_image(image: &RasterImage) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    image.width().hash(&mut hasher);
    image.height().hash(&mut hasher);
    image.rgba().hash(&mut hasher);
    hasher.finish()
}

fn image_object(image: &RasterImage, smask_id: Option<usize>, compress: bool) -> Vec<u8> {
    let smask = smask_id
        .map(|id| format!(" /SMask {} 0 R", id))
        .unwrap_or_default();
    let dict = format!(
        " /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceRGB /BitsPerComponent 8{}",
        image.width(),
        image.height(),
        smask
    );
    stream_object(&dict, &image.rgb_bytes(), compress)
}

fn image_smask_object(image: &RasterImage, compress: bool) -> Vec<u8> {
    let dict = format!(
        " /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceGray /BitsPerComponent 8",
        image.width(),
        image.height()
    );
    stream_object(&dict, &image.alpha_bytes(), compress)
}

fn font_object(name: &str) -> String {
    let base = sanitize_font_name(name);
    format!(
        "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
        base
    )
}

fn truetype_font_object(font: &RegisteredFont, descriptor_id: usize) -> String {
    let base = sanitize_font_name(&font.name);
    let metrics = &font.metrics;
    let widths = metrics
        .widths
        .iter()
        .map(|value| value.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "<< /Type /Font /Subtype /TrueType /BaseFont /{} /FirstChar {} /LastChar {} /Widths [{}] /FontDescriptor {} 0 R /Encoding /WinAnsiEncoding >>",
        base, metrics.first_char, metrics.last_char, widths, descriptor_id
    )
}

fn font_descriptor_object(font: &RegisteredFont, font_file_id: usize) -> String {
    let base = sanitize_font_name(&font.name);
    let metrics = &font.metrics;
    // Nonsymbolic; the WinAnsi encoding is authoritative.
    let flags = 32;
    format!(
        "<< /Type /FontDescriptor /FontName /{} /Flags {} /FontBBox [{} {} {} {}] /ItalicAngle {} /Ascent {} /Descent {} /CapHeight {} /StemV 80 /MissingWidth {} /FontFile2 {} 0 R >>",
        base,
        flags,
        metrics.bbox.0,
        metrics.bbox.1,
        metrics.bbox.2,
        metrics.bbox.3,
        metrics.italic_angle,
        metrics.ascent,
        metrics.descent,
        metrics.ascent,
        metrics.missing_width,
        font_file_id
    )
}

fn font_file_object(data: &[u8], compress: bool) -> Vec<u8> {
    stream_object(&format!(" /Length1 {}", data.len()), data, compress)
}

fn resource_dict(entries: &[(String, usize)]) -> String {
    let mut out = Vec::new();
    for (resource, obj_id) in entries {
        out.push(format!("/{} {} 0 R", resource, obj_id));
    }
    format!("<< {} >>", out.join(" "))
}

fn info_object(title: Option<&str>) -> String {
    let mut entries = vec![format!("/Producer ({})", PRODUCER)];
    if let Some(title) = title {
        entries.push(format!("/Title ({})", encode_winansi_pdf_string(title).text));
    }
    format!("<< {} >>", entries.join(" "))
}

fn sanitize_font_name(name: &str) -> String {
    let mut out = String::new();
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            out.push(ch);
        } else if ch == ' ' {
            out.push('-');
        }
    }
    if out.is_empty() {
        DEFAULT_FONT.to_string()
    } else {
        out
    }
}

fn quantize_alpha(value: f32) -> u16 {
    ((value * 1000.0).round() as i32).clamp(0, 1000) as u16
}

struct WinAnsiEncoded {
    text: String,
    replaced: usize,
}

/// Encodes `input` as a WinAnsi literal string body, escaping delimiters and
/// writing non-ASCII bytes as octal. Unmappable characters become `?`.
fn encode_winansi_pdf_string(input: &str) -> WinAnsiEncoded {
    let mut out = String::new();
    let mut replaced = 0usize;
    for ch in input.chars() {
        let byte = match ch {
            '\u{0000}'..='\u{007F}' => ch as u8,
            '\u{00A0}'..='\u{00FF}' => ch as u8,
            '\u{20AC}' => 0x80,
            '\u{201A}' => 0x82,
            '\u{0192}' => 0x83,
            '\u{201E}' => 0x84,
            '\u{2026}' => 0x85,
            '\u{2020}' => 0x86,
            '\u{2021}' => 0x87,
            '\u{02C6}' => 0x88,
            '\u{2030}' => 0x89,
            '\u{0160}' => 0x8A,
            '\u{2039}' => 0x8B,
            '\u{0152}' => 0x8C,
            '\u{017D}' => 0x8E,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{02DC}' => 0x98,
            '\u{2122}' => 0x99,
            '\u{0161}' => 0x9A,
            '\u{203A}' => 0x9B,
            '\u{0153}' => 0x9C,
            '\u{017E}' => 0x9E,
            '\u{0178}' => 0x9F,
            _ => {
                replaced += 1;
                b'?'
            }
        };

        match byte {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b if b < 0x20 || b >= 0x7f => out.push_str(&format!("\\{:03o}", b)),
            b => out.push(b as char),
        }
    }
    WinAnsiEncoded {
        text: out,
        replaced,
    }
}

fn fmt(value: f32) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let milli = (f64::from(value) * 1000.0)
        .round()
        .clamp(i64::MIN as f64, i64::MAX as f64) as i64;
    format_milli(milli)
}

fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.unsigned_abs();
    let int_part = abs / 1000;
    let frac_part = abs % 1000;
    if frac_part == 0 {
        format!("{}{}", sign, int_part)
    } else {
        let mut s = format!("{}{}.{:03}", sign, int_part, frac_part);
        while s.ends_with('0') {
            s.pop();
        }
        s
    }
}

fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}

fn color_to_pdf_fill(color: Color) -> String {
    format!("{} {} {} rg\n", fmt(color.r), fmt(color.g), fmt(color.b))
}

fn color_to_pdf_stroke(color: Color) -> String {
    format!("{} {} {} RG\n", fmt(color.r), fmt(color.g), fmt(color.b))
}
