//! Padding node configuration (spec §4.7).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddingKind {
    FixedLength,
    Alignment,
    Dynamic,
    FillContainer,
}

#[derive(Debug, Clone)]
pub struct PaddingConfig {
    pub kind: PaddingKind,
    /// Target length in bits for `FixedLength`/`Alignment` (for `Alignment`
    /// this is the boundary).
    pub target_length: u32,
    /// `DYNAMIC` only: expression evaluated with `currentLength`,
    /// `targetLength`, and `node` bound.
    pub length_expression: Option<String>,
    /// `FILL_CONTAINER` only: id of the container this padding fills.
    pub container_id: Option<String>,
    pub auto_calculate_container_length: bool,
    /// `FILL_CONTAINER` only, used when `auto_calculate_container_length` is false.
    pub container_fixed_length: Option<u32>,
    pub min_padding_length: u32,
    pub max_padding_length: u32,
    /// Fill byte pattern; repeated to fill if `repeat_pattern`, else written
    /// once with the remainder implicit-zero.
    pub pattern: Vec<u8>,
    pub repeat_pattern: bool,
    pub enabled: bool,
    pub enable_condition: Option<String>,
}

impl Default for PaddingConfig {
    fn default() -> Self {
        Self {
            kind: PaddingKind::FixedLength,
            target_length: 0,
            length_expression: None,
            container_id: None,
            auto_calculate_container_length: true,
            container_fixed_length: None,
            min_padding_length: 0,
            max_padding_length: u32::MAX,
            pattern: vec![0],
            repeat_pattern: true,
            enabled: true,
            enable_condition: None,
        }
    }
}

impl PaddingConfig {
    pub fn clamp(&self, length: i64) -> i64 {
        length
            .max(self.min_padding_length as i64)
            .min(self.max_padding_length as i64)
    }
}
