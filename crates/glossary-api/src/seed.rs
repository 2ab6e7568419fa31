use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use glossary_core::SeedItem;
use serde::Deserialize;
use serde_json::{Map, Value};

const REFERENCE_CORPUS: &[(&str, &str)] = &[
    ("epistemologia", "Ramo da filosofia que estuda a natureza, as origens e os limites do conhecimento."),
    ("ontologia", "Estudo do ser enquanto ser, das categorias fundamentais do que existe."),
    ("ética", "Reflexão filosófica sobre a ação humana, o bem e os critérios do agir correto."),
    ("metafísica", "Investigação dos princípios primeiros e das causas últimas da realidade."),
    ("estética", "Disciplina que estuda o belo, a arte e a experiência sensível."),
    ("lógica", "Estudo das formas válidas de inferência e dos princípios do raciocínio correto."),
    ("dialética", "Método de pensamento que avança pelo confronto de teses opostas."),
    ("empirismo", "Doutrina segundo a qual todo conhecimento deriva da experiência sensível."),
    ("racionalismo", "Doutrina que atribui à razão a fonte principal do conhecimento."),
    ("fenomenologia", "Descrição das estruturas da consciência tal como as coisas aparecem a ela."),
    ("existencialismo", "Corrente que parte da existência concreta e da liberdade do indivíduo."),
    ("niilismo", "Posição que nega a existência de valores, sentidos ou verdades absolutas."),
    ("ceticismo", "Atitude que suspende o juízo diante da impossibilidade de certeza."),
    ("a priori", "Conhecimento independente da experiência, válido antes de qualquer observação."),
    ("a posteriori", "Conhecimento que depende da experiência para ser justificado."),
];

/// Built-in philosophy vocabulary used by `seed` when no corpus file is given.
#[must_use]
pub fn reference_corpus() -> Vec<SeedItem> {
    REFERENCE_CORPUS
        .iter()
        .map(|(term, definition)| SeedItem::new(*term, *definition))
        .collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CorpusFile {
    Items(Vec<SeedItem>),
    Mapping(Map<String, Value>),
}

/// Load a corpus from a JSON file holding either a list of
/// `{"term", "definition"}` objects or a single `{term: definition}` object.
///
/// # Errors
/// Fails when the file cannot be read, is not valid JSON in one of those
/// shapes, or maps a term to something other than a string.
pub fn load_corpus_file(path: &Path) -> Result<Vec<SeedItem>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read corpus file {}", path.display()))?;
    let parsed: CorpusFile = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse corpus file {}", path.display()))?;

    match parsed {
        CorpusFile::Items(items) => Ok(items),
        CorpusFile::Mapping(map) => map
            .into_iter()
            .map(|(term, value)| match value {
                Value::String(definition) => Ok(SeedItem { term, definition }),
                other => Err(anyhow::anyhow!(
                    "corpus entry `{term}` must map to a string definition (got {other})"
                )),
            })
            .collect(),
    }
}
