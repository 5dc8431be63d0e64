use lopdf::Document;

use crate::PageTextSource;

/// Per-page PDF text via `lopdf`, in page-number order.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfPageSource;

impl PageTextSource for LopdfPageSource {
    fn page_texts(&self, bytes: &[u8]) -> Result<Vec<String>, String> {
        let document = Document::load_mem(bytes).map_err(|err| err.to_string())?;
        document
            .get_pages()
            .keys()
            .map(|page_number| {
                document
                    .extract_text(&[*page_number])
                    .map_err(|err| format!("page {page_number}: {err}"))
            })
            .collect()
    }
}
