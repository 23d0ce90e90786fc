use std::collections::HashMap;

use annotator_core::split_type_display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityColor {
    Red,
    Blue,
    Green,
    Yellow,
    Purple,
    Pink,
    Indigo,
    Cyan,
    Rose,
}

impl EntityColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityColor::Red => "red",
            EntityColor::Blue => "blue",
            EntityColor::Green => "green",
            EntityColor::Yellow => "yellow",
            EntityColor::Purple => "purple",
            EntityColor::Pink => "pink",
            EntityColor::Indigo => "indigo",
            EntityColor::Cyan => "cyan",
            EntityColor::Rose => "rose",
        }
    }
}

const PALETTE: [EntityColor; 8] = [
    EntityColor::Red,
    EntityColor::Blue,
    EntityColor::Green,
    EntityColor::Yellow,
    EntityColor::Purple,
    EntityColor::Pink,
    EntityColor::Indigo,
    EntityColor::Cyan,
];

const BASE: [(&str, EntityColor); 5] = [
    ("L50", EntityColor::Blue),
    ("J31.0", EntityColor::Purple),
    ("T78.1", EntityColor::Green),
    ("T56.8", EntityColor::Yellow),
    ("R06.2", EntityColor::Rose),
];

#[derive(Debug, Clone)]
pub struct ColorRegistry {
    assigned: HashMap<String, EntityColor>,
}

impl Default for ColorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ColorRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            assigned: HashMap::new(),
        };
        registry.clear();
        registry
    }

    pub fn color_for(&mut self, entity_type: &str) -> EntityColor {
        let key = color_key(entity_type);
        if let Some(color) = self.assigned.get(key) {
            return *color;
        }
        let color = palette_color(key);
        self.assigned.insert(key.to_string(), color);
        color
    }

    pub fn peek(&self, entity_type: &str) -> EntityColor {
        let key = color_key(entity_type);
        self.assigned
            .get(key)
            .copied()
            .unwrap_or_else(|| palette_color(key))
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }

    pub fn clear(&mut self) {
        self.assigned.clear();
        for (code, color) in BASE {
            self.assigned.insert(code.to_string(), color);
        }
    }
}

fn color_key(entity_type: &str) -> &str {
    split_type_display(entity_type.trim()).0
}

fn palette_color(key: &str) -> EntityColor {
    let sum: u32 = key.chars().map(u32::from).sum();
    PALETTE[(sum % PALETTE.len() as u32) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_codes_keep_their_colors() {
        let mut registry = ColorRegistry::new();
        assert_eq!(registry.color_for("L50"), EntityColor::Blue);
        assert_eq!(registry.color_for("R06.2"), EntityColor::Rose);
        assert_eq!(registry.color_for("T56.8 - Toxic effect"), EntityColor::Yellow);
    }

    #[test]
    fn hashes_char_codes_into_palette() {
        let mut registry = ColorRegistry::new();
        // 'D'+'5'+'0'+'.'+'9' = 272, 272 % 8 = 0
        assert_eq!(registry.color_for("D50.9"), EntityColor::Red);
        assert_eq!(
            registry.color_for("D50.9 - Iron deficiency anemia, unspecified"),
            EntityColor::Red
        );
        assert_eq!(registry.len(), BASE.len() + 1);
    }

    #[test]
    fn clear_restores_fixed_table() {
        let mut registry = ColorRegistry::new();
        registry.color_for("E11.9");
        registry.color_for("Symptom");
        registry.clear();
        assert_eq!(registry.len(), BASE.len());
        assert_eq!(registry.peek("J31.0"), EntityColor::Purple);
    }
}
