//! Materials and chemical elements.

use std::sync::Arc;

use smallvec::SmallVec;

use super::NodeIdentity;

/// A chemical element.
#[derive(Debug, Clone)]
pub struct Element {
    identity: NodeIdentity,
    pub name: String,
    pub symbol: String,
    /// Atomic number.
    pub z: f64,
    /// Atomic mass.
    pub a: f64,
}

impl Element {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>, z: f64, a: f64) -> Arc<Self> {
        Arc::new(Self {
            identity: NodeIdentity::next(),
            name: name.into(),
            symbol: symbol.into(),
            z,
            a,
        })
    }

    pub fn identity(&self) -> NodeIdentity {
        self.identity
    }
}

/// Value equality. Identity is ignored.
impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.symbol == other.symbol && self.z == other.z && self.a == other.a
    }
}

/// One `(element, mass fraction)` entry of a material.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialComponent {
    pub element: Arc<Element>,
    pub fraction: f64,
}

/// A material: name, density and an ordered element composition.
#[derive(Debug, Clone)]
pub struct Material {
    identity: NodeIdentity,
    pub name: String,
    pub density: f64,
    pub components: SmallVec<[MaterialComponent; 4]>,
}

impl Material {
    pub fn new(name: impl Into<String>, density: f64) -> Self {
        Self {
            identity: NodeIdentity::next(),
            name: name.into(),
            density,
            components: SmallVec::new(),
        }
    }

    /// Builder: append an element with its mass fraction.
    pub fn with_element(mut self, element: Arc<Element>, fraction: f64) -> Self {
        self.components.push(MaterialComponent { element, fraction });
        self
    }

    pub fn identity(&self) -> NodeIdentity {
        self.identity
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl PartialEq for Material {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.density == other.density && self.components == other.components
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_equality_ignores_identity() {
        let h1 = Element::new("Hydrogen", "H", 1.0, 1.008);
        let h2 = Element::new("Hydrogen", "H", 1.0, 1.008);
        assert_ne!(h1.identity(), h2.identity());
        assert_eq!(*h1, *h2);

        let water1 = Material::new("Water", 1.0).with_element(h1, 0.112);
        let water2 = Material::new("Water", 1.0).with_element(h2, 0.112);
        assert_eq!(water1, water2);
        assert_ne!(water1.identity(), water2.identity());
    }
}
