use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One entry of the style catalog: a display name (unique, acts as the
/// key everywhere), the generation instruction sent to the image model,
/// and a placeholder preview shown before the style has rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleDescriptor {
    pub name: String,
    pub prompt: String,
    pub preview_url: String,
}

/// Ordered, immutable style catalog. Order matters: the first entry is
/// the one generated synchronously on upload.
#[derive(Debug, Clone)]
pub struct StyleCatalog {
    styles: IndexMap<String, StyleDescriptor>,
}

impl StyleCatalog {
    pub fn new(styles: Vec<StyleDescriptor>) -> Self {
        let mut map = IndexMap::new();
        for style in styles {
            map.insert(style.name.clone(), style);
        }
        Self { styles: map }
    }

    pub fn first(&self) -> Option<&StyleDescriptor> {
        self.styles.values().next()
    }

    pub fn get(&self, name: &str) -> Option<&StyleDescriptor> {
        self.styles.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StyleDescriptor> {
        self.styles.values()
    }

    pub fn names(&self) -> Vec<&str> {
        self.styles.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}

impl Default for StyleCatalog {
    fn default() -> Self {
        default_catalog()
    }
}

/// The built-in interior design catalog.
pub fn default_catalog() -> StyleCatalog {
    let mut styles = Vec::new();
    let mut push = |name: &str, prompt: &str, seed: &str| {
        styles.push(StyleDescriptor {
            name: name.to_string(),
            prompt: prompt.to_string(),
            preview_url: format!("https://picsum.photos/seed/{seed}/200/200"),
        });
    };

    push(
        "Mid-Century Modern",
        "Reimagine this room in a Mid-Century Modern style, with clean lines, organic forms, and natural materials.",
        "mcm",
    );
    push(
        "Scandinavian",
        "Reimagine this room in a Scandinavian style, emphasizing minimalism, functionality, and light, neutral colors.",
        "scandi",
    );
    push(
        "Industrial",
        "Reimagine this room in an Industrial style, featuring raw materials like exposed brick, metal, and wood.",
        "industrial",
    );
    push(
        "Bohemian",
        "Reimagine this room in a Bohemian style, with a free-spirited mix of patterns, textures, and vibrant colors.",
        "boho",
    );
    push(
        "Coastal",
        "Reimagine this room in a Coastal style, with light, airy colors, natural textures, and beach-inspired decor.",
        "coastal",
    );
    push(
        "Minimalist",
        "Reimagine this room in a Minimalist style, focusing on simplicity, a monochromatic palette, and uncluttered spaces.",
        "minimal",
    );
    push(
        "Art Deco",
        "Reimagine this room in an Art Deco style, characterized by bold geometric patterns, luxurious materials like gold and velvet, and a glamorous, symmetrical design.",
        "artdeco",
    );
    push(
        "Japandi",
        "Reimagine this room in a Japandi style, blending Japanese minimalism with Scandinavian functionality, using natural materials, neutral tones, and a focus on craftsmanship.",
        "japandi",
    );
    push(
        "Farmhouse",
        "Reimagine this room in a modern Farmhouse style, with a cozy, rustic feel, featuring shiplap walls, reclaimed wood, neutral colors, and comfortable furnishings.",
        "farmhouse",
    );

    StyleCatalog::new(styles)
}
