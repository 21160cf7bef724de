use super::Cluster;
use crate::rng::XorShift64Star;
use indexmap::IndexMap;
use rustc_hash::{FxBuildHasher, FxHashSet};
use serde::{Deserialize, Serialize};
use std::hash::Hash;

const MAX_DRAWS: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// `#rrggbb`, lowercase.
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Seeded source of cluster colors.
#[derive(Debug, Clone)]
pub struct Palette {
    rng: XorShift64Star,
}

impl Palette {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: XorShift64Star::new(seed),
        }
    }

    pub fn draw(&mut self) -> Color {
        let bits = self.rng.next_u64();
        Color::new((bits >> 16) as u8, (bits >> 24) as u8, (bits >> 32) as u8)
    }

    /// Draws until `taken` rejects nothing, giving up after a bounded number of attempts.
    pub fn draw_unused(&mut self, taken: impl Fn(&Color) -> bool) -> Color {
        let mut color = self.draw();
        for _ in 0..MAX_DRAWS {
            if !taken(&color) {
                break;
            }
            color = self.draw();
        }
        color
    }
}

/// Persistent `anchor entity -> color` cache that keeps cluster colors stable across ticks.
#[derive(Debug, Clone)]
pub struct ColorRegistry<K> {
    cache: IndexMap<K, Color, FxBuildHasher>,
    palette: Palette,
    purge_unused: bool,
}

impl<K: Clone + Eq + Hash> ColorRegistry<K> {
    pub fn new(seed: u64, purge_unused: bool) -> Self {
        Self {
            cache: IndexMap::default(),
            palette: Palette::new(seed),
            purge_unused,
        }
    }

    pub fn colors(&self) -> &IndexMap<K, Color, FxBuildHasher> {
        &self.cache
    }

    pub fn color_of(&self, anchor: &K) -> Option<Color> {
        self.cache.get(anchor).copied()
    }

    pub fn forget(&mut self, entity: &K) -> Option<Color> {
        self.cache.shift_remove(entity)
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Assigns a color to each group.
    ///
    /// A group keeps the cached color of its first member whose color is not yet claimed by an
    /// earlier group this round; that member becomes the anchor. Otherwise the group gets a
    /// fresh color anchored on its first member. Empty groups are dropped.
    pub fn reconcile(&mut self, groups: Vec<Vec<K>>) -> Vec<Cluster<K>> {
        let mut claimed: FxHashSet<Color> = FxHashSet::default();
        let mut anchors: FxHashSet<K> = FxHashSet::default();
        let mut out = Vec::with_capacity(groups.len());

        for members in groups {
            let Some(first) = members.first() else {
                continue;
            };
            let reused = members.iter().find_map(|m| {
                self.cache
                    .get(m)
                    .filter(|c| !claimed.contains(*c))
                    .map(|c| (m.clone(), *c))
            });
            let (anchor, color) = match reused {
                Some(hit) => hit,
                None => {
                    let cache = &self.cache;
                    let color = self.palette.draw_unused(|c| {
                        claimed.contains(c) || cache.values().any(|used| used == c)
                    });
                    self.cache.insert(first.clone(), color);
                    (first.clone(), color)
                }
            };
            claimed.insert(color);
            anchors.insert(anchor.clone());
            out.push(Cluster {
                members,
                color,
                anchor,
            });
        }

        if self.purge_unused {
            self.cache.retain(|k, _| anchors.contains(k));
        }
        out
    }
}
