//! Layout templates and structural matching.
//!
//! A layout template describes, per document type and page side, where
//! each semantic field sits in normalized coordinates. The matcher
//! assigns detected groups to template fields by geometric overlap and
//! scores how well the page structure fits the template.
//!
//! Templates live in an explicit, immutable [`LayoutStore`] built once
//! and passed to the matcher, so tests and embedders control exactly
//! which layouts are visible.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::config::LayoutConfig;
use crate::core::errors::{VerifyError, VerifyResult};
use crate::pipeline::segmenter::{Group, PageGroups};
use crate::processors::geometry::NormBBox;

/// One field's box inside a page template, in normalized coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemplateField {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
}

impl TemplateField {
    /// Builds a field from a normalized box, deriving width and height.
    pub fn from_bbox(bbox: NormBBox) -> Self {
        Self {
            x1: bbox.x1,
            y1: bbox.y1,
            x2: bbox.x2,
            y2: bbox.y2,
            width: bbox.width(),
            height: bbox.height(),
        }
    }

    /// The field's box as a [`NormBBox`].
    pub fn bbox(&self) -> NormBBox {
        NormBBox::new(self.x1, self.y1, self.x2, self.y2)
    }
}

/// Template for one page side: field name to expected box.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageTemplate {
    /// Side label, e.g. "front" or "back".
    pub side: String,
    /// Fields keyed by semantic name.
    pub template: BTreeMap<String, TemplateField>,
}

/// All templates of one document type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentLayout {
    /// Human-readable key, e.g. "cedula".
    pub document_key: String,
    #[serde(default)]
    pub document_type: Option<String>,
    pub document_type_id: u32,
    #[serde(default)]
    pub version: Option<String>,
    /// One template per expected page, in page order.
    pub templates: Vec<PageTemplate>,
}

/// On-disk layout file body. The document type id and key come from the
/// file name, not the body.
#[derive(Debug, Deserialize)]
struct LayoutFile {
    #[serde(default)]
    document_type: Option<String>,
    #[serde(default)]
    version: Option<String>,
    templates: Vec<PageTemplate>,
}

/// Immutable collection of document layouts keyed by document type id.
#[derive(Debug, Clone, Default)]
pub struct LayoutStore {
    layouts: HashMap<u32, DocumentLayout>,
}

impl LayoutStore {
    /// Builds a store from in-memory layout definitions. Later
    /// definitions with a duplicate id replace earlier ones.
    pub fn from_definitions(definitions: impl IntoIterator<Item = DocumentLayout>) -> Self {
        let layouts = definitions
            .into_iter()
            .map(|layout| (layout.document_type_id, layout))
            .collect();
        Self { layouts }
    }

    /// Loads every `*.json` layout in a directory. File names follow
    /// `{document_type_id}_{document_key}.json`; files that fail to
    /// parse are skipped with a warning.
    pub fn from_dir(dir: &Path) -> VerifyResult<Self> {
        let mut layouts = HashMap::new();

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            match Self::load_layout_file(&path) {
                Ok(layout) => {
                    layouts.insert(layout.document_type_id, layout);
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable layout");
                }
            }
        }

        Ok(Self { layouts })
    }

    fn load_layout_file(path: &Path) -> VerifyResult<DocumentLayout> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let (id_part, key_part) = stem.split_once('_').unwrap_or((stem, stem));
        let document_type_id: u32 = id_part.parse().map_err(|_| {
            VerifyError::config_mismatch(format!(
                "layout file name {stem:?} does not start with a numeric document type id"
            ))
        })?;

        let body: LayoutFile = serde_json::from_str(&fs::read_to_string(path)?)?;

        Ok(DocumentLayout {
            document_key: key_part.to_string(),
            document_type: body.document_type,
            document_type_id,
            version: body.version,
            templates: body.templates,
        })
    }

    /// Looks up the layout for a document type id.
    pub fn get(&self, document_type_id: u32) -> Option<&DocumentLayout> {
        self.layouts.get(&document_type_id)
    }

    /// Number of stored layouts.
    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    /// True when no layouts are stored.
    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}

/// Match result for one template field on one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMatch {
    /// True when at least one group was assigned to the field.
    pub exists: bool,
    /// Merged normalized box of the assigned groups.
    pub assigned: Option<NormBBox>,
    /// Ids of the assigned groups, in assignment order.
    pub group_ids: Vec<usize>,
    pub iou: f64,
    pub coverage: f64,
    pub spill_penalty: f64,
}

impl FieldMatch {
    fn missing() -> Self {
        Self {
            exists: false,
            assigned: None,
            group_ids: Vec::new(),
            iou: 0.0,
            coverage: 0.0,
            spill_penalty: 0.0,
        }
    }
}

/// Aggregated structural score of one page. Averages run over detected
/// fields only; the coverage ratio accounts for the missing ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageScore {
    pub final_score: f64,
    pub coverage_ratio: f64,
    pub average_iou: f64,
    pub average_coverage: f64,
    pub average_spill: f64,
    pub total_fields: usize,
    pub detected_fields: usize,
    pub passes: bool,
}

/// One page matched against its template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageMatch {
    /// 0-based page index.
    pub page: usize,
    /// Side label of the template used.
    pub side: String,
    /// Per-field match results keyed by field name.
    pub fields: BTreeMap<String, FieldMatch>,
    pub score: PageScore,
}

/// Structural matching result for a whole document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuralReport {
    pub document_type_id: u32,
    pub pages: Vec<PageMatch>,
    /// Mean of the per-page final scores.
    pub structural_score: f64,
}

/// Matches segmented pages against the layout of a document type.
#[derive(Debug, Clone)]
pub struct LayoutMatcher {
    store: LayoutStore,
    config: LayoutConfig,
}

impl LayoutMatcher {
    /// Creates a matcher over an immutable store.
    pub fn new(store: LayoutStore, config: LayoutConfig) -> Self {
        Self { store, config }
    }

    /// Read access to the underlying store.
    pub fn store(&self) -> &LayoutStore {
        &self.store
    }

    /// Matches every page of a document.
    ///
    /// Fails with a configuration mismatch when the document type has no
    /// layout or fewer pages arrive than the layout requires. Extra
    /// pages beyond the template count reuse the last template.
    pub fn match_document(
        &self,
        document_type_id: u32,
        pages: &[PageGroups],
    ) -> VerifyResult<StructuralReport> {
        let layout = self.store.get(document_type_id).ok_or_else(|| {
            VerifyError::config_mismatch(format!(
                "no layout registered for document type {document_type_id}"
            ))
        })?;

        if pages.len() < layout.templates.len() {
            return Err(VerifyError::config_mismatch(format!(
                "layout for document type {document_type_id} expects {} pages, got {}",
                layout.templates.len(),
                pages.len()
            )));
        }

        let mut page_matches = Vec::with_capacity(pages.len());
        for (page_idx, page) in pages.iter().enumerate() {
            let (template, side) = match layout.templates.get(page_idx) {
                Some(t) => (t, t.side.clone()),
                None => {
                    let last = layout
                        .templates
                        .last()
                        .ok_or_else(|| {
                            VerifyError::config_mismatch(format!(
                                "layout for document type {document_type_id} has no templates"
                            ))
                        })?;
                    (last, format!("page_{page_idx}"))
                }
            };

            page_matches.push(self.match_page(page_idx, side, page, template));
        }

        let page_scores: Vec<f64> = page_matches.iter().map(|p| p.score.final_score).collect();
        let structural_score = if page_scores.is_empty() {
            0.0
        } else {
            page_scores.iter().sum::<f64>() / page_scores.len() as f64
        };

        debug!(
            document_type_id,
            structural_score,
            pages = page_matches.len(),
            "layout matching finished"
        );

        Ok(StructuralReport {
            document_type_id,
            pages: page_matches,
            structural_score,
        })
    }

    fn match_page(
        &self,
        page_idx: usize,
        side: String,
        page: &PageGroups,
        template: &PageTemplate,
    ) -> PageMatch {
        let (width, height) = page.image_size;
        let normalized: Vec<(usize, NormBBox)> = page
            .groups
            .iter()
            .map(|g| (g.id, g.bbox.normalize(width, height)))
            .collect();

        let mut fields = BTreeMap::new();
        for (name, field) in &template.template {
            fields.insert(
                name.clone(),
                self.match_field(&normalized, &field.bbox()),
            );
        }

        let score = self.score_page(&fields);
        PageMatch {
            page: page_idx,
            side,
            fields,
            score,
        }
    }

    /// Assigns every group whose overlap ratio with the field box meets
    /// the threshold, then merges the assigned boxes and scores them.
    fn match_field(&self, groups: &[(usize, NormBBox)], field_box: &NormBBox) -> FieldMatch {
        let assigned: Vec<&(usize, NormBBox)> = groups
            .iter()
            .filter(|(_, bbox)| bbox.overlap_ratio(field_box) >= self.config.overlap_threshold)
            .collect();

        let merged = match NormBBox::merge_all(assigned.iter().map(|(_, b)| b)) {
            Some(m) => m,
            None => return FieldMatch::missing(),
        };

        FieldMatch {
            exists: true,
            assigned: Some(merged),
            group_ids: assigned.iter().map(|(id, _)| *id).collect(),
            iou: merged.iou(field_box),
            coverage: merged.coverage_of(field_box),
            spill_penalty: merged.spill_penalty(field_box),
        }
    }

    fn score_page(&self, fields: &BTreeMap<String, FieldMatch>) -> PageScore {
        let total_fields = fields.len();
        if total_fields == 0 {
            return PageScore {
                final_score: 0.0,
                coverage_ratio: 0.0,
                average_iou: 0.0,
                average_coverage: 0.0,
                average_spill: 0.0,
                total_fields: 0,
                detected_fields: 0,
                passes: false,
            };
        }

        let detected: Vec<&FieldMatch> = fields.values().filter(|f| f.exists).collect();
        let detected_fields = detected.len();

        let mean = |select: fn(&FieldMatch) -> f64| -> f64 {
            if detected.is_empty() {
                0.0
            } else {
                detected.iter().map(|f| select(f)).sum::<f64>() / detected.len() as f64
            }
        };

        let average_iou = mean(|f| f.iou);
        let average_coverage = mean(|f| f.coverage);
        let average_spill = mean(|f| f.spill_penalty);
        let coverage_ratio = detected_fields as f64 / total_fields as f64;

        let final_score = 0.4 * coverage_ratio + 0.3 * average_iou + 0.2 * average_coverage
            - 0.1 * average_spill;

        PageScore {
            final_score,
            coverage_ratio,
            average_iou,
            average_coverage,
            average_spill,
            total_fields,
            detected_fields,
            passes: final_score >= self.config.page_pass_score,
        }
    }
}

/// Builds a page template from labeled groups: for each field, the
/// member groups' pixel boxes are merged, normalized, inflated by the
/// margin and rounded to two decimals. Fields whose groups are all
/// absent are omitted.
pub fn build_template(
    groups: &[Group],
    image_size: (u32, u32),
    field_groups: &BTreeMap<String, Vec<usize>>,
    margin: f64,
) -> BTreeMap<String, TemplateField> {
    let (width, height) = image_size;
    let by_id: HashMap<usize, &Group> = groups.iter().map(|g| (g.id, g)).collect();

    let mut template = BTreeMap::new();
    for (field, ids) in field_groups {
        let boxes: Vec<NormBBox> = ids
            .iter()
            .filter_map(|id| by_id.get(id))
            .map(|g| g.bbox.normalize(width, height))
            .collect();

        if let Some(merged) = NormBBox::merge_all(boxes.iter()) {
            let bbox = merged.inflate(margin).round(2);
            template.insert(field.clone(), TemplateField::from_bbox(bbox));
        }
    }

    template
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::segmenter::{Region, RegionKind, VerticalBand};
    use crate::processors::geometry::BBox;
    use std::io::Write;

    fn group(id: usize, x1: i32, y1: i32, x2: i32, y2: i32) -> Group {
        let bbox = BBox::new(x1, y1, x2, y2);
        Group {
            id,
            kind: RegionKind::Text,
            bbox,
            regions: vec![Region {
                id,
                bbox,
                density: 0.3,
                kind: RegionKind::Text,
                band: VerticalBand::Upper,
            }],
        }
    }

    fn field(x1: f64, y1: f64, x2: f64, y2: f64) -> TemplateField {
        TemplateField::from_bbox(NormBBox::new(x1, y1, x2, y2))
    }

    fn one_page_layout(fields: Vec<(&str, TemplateField)>) -> DocumentLayout {
        let template = fields
            .into_iter()
            .map(|(name, f)| (name.to_string(), f))
            .collect();
        DocumentLayout {
            document_key: "cedula".into(),
            document_type: Some("national id".into()),
            document_type_id: 1,
            version: Some("1".into()),
            templates: vec![PageTemplate {
                side: "front".into(),
                template,
            }],
        }
    }

    fn matcher(layout: DocumentLayout) -> LayoutMatcher {
        LayoutMatcher::new(
            LayoutStore::from_definitions([layout]),
            LayoutConfig::default(),
        )
    }

    #[test]
    fn missing_document_type_is_a_config_mismatch() {
        let m = matcher(one_page_layout(vec![("nombre", field(0.0, 0.0, 0.5, 0.2))]));
        let pages = vec![PageGroups {
            groups: vec![],
            image_size: (100, 100),
        }];
        let err = m.match_document(99, &pages).unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION_MISMATCH_ERROR");
    }

    #[test]
    fn fewer_pages_than_templates_is_a_config_mismatch() {
        let mut layout = one_page_layout(vec![("nombre", field(0.0, 0.0, 0.5, 0.2))]);
        layout.templates.push(layout.templates[0].clone());
        let m = matcher(layout);
        let pages = vec![PageGroups {
            groups: vec![],
            image_size: (100, 100),
        }];
        let err = m.match_document(1, &pages).unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION_MISMATCH_ERROR");
    }

    #[test]
    fn extra_pages_reuse_the_last_template() {
        let m = matcher(one_page_layout(vec![("nombre", field(0.0, 0.0, 1.0, 1.0))]));
        let page = PageGroups {
            groups: vec![group(1, 10, 10, 90, 90)],
            image_size: (100, 100),
        };
        let report = m.match_document(1, &[page.clone(), page]).unwrap();
        assert_eq!(report.pages.len(), 2);
        assert_eq!(report.pages[0].side, "front");
        assert_eq!(report.pages[1].side, "page_1");
        assert!(report.pages[1].fields["nombre"].exists);
    }

    #[test]
    fn group_inside_field_scores_high() {
        let m = matcher(one_page_layout(vec![("nombre", field(0.0, 0.0, 0.6, 0.4))]));
        let pages = vec![PageGroups {
            groups: vec![group(1, 5, 5, 55, 35)],
            image_size: (100, 100),
        }];
        let report = m.match_document(1, &pages).unwrap();
        let f = &report.pages[0].fields["nombre"];
        assert!(f.exists);
        assert_eq!(f.group_ids, vec![1]);
        assert!(f.coverage > 0.5);
        assert!(f.spill_penalty < 1e-9);
        assert!(report.pages[0].score.passes);
    }

    #[test]
    fn group_far_from_field_is_not_assigned() {
        let m = matcher(one_page_layout(vec![("nombre", field(0.0, 0.0, 0.3, 0.2))]));
        let pages = vec![PageGroups {
            groups: vec![group(1, 70, 70, 95, 95)],
            image_size: (100, 100),
        }];
        let report = m.match_document(1, &pages).unwrap();
        let f = &report.pages[0].fields["nombre"];
        assert!(!f.exists);
        assert!(f.assigned.is_none());
        assert_eq!(report.pages[0].score.detected_fields, 0);
    }

    #[test]
    fn empty_page_scores_exactly_zero() {
        let m = matcher(one_page_layout(vec![
            ("nombre", field(0.0, 0.0, 0.5, 0.2)),
            ("fecha", field(0.5, 0.5, 0.9, 0.7)),
        ]));
        let pages = vec![PageGroups {
            groups: vec![],
            image_size: (100, 100),
        }];
        let report = m.match_document(1, &pages).unwrap();
        assert_eq!(report.structural_score, 0.0);
        assert_eq!(report.pages[0].score.final_score, 0.0);
        assert!(!report.pages[0].score.passes);
        assert!(report.pages[0].fields.values().all(|f| !f.exists));
    }

    #[test]
    fn multiple_assigned_groups_are_merged() {
        let m = matcher(one_page_layout(vec![("nombre", field(0.0, 0.0, 1.0, 0.5))]));
        let pages = vec![PageGroups {
            groups: vec![group(1, 10, 10, 40, 30), group(2, 50, 10, 90, 30)],
            image_size: (100, 100),
        }];
        let report = m.match_document(1, &pages).unwrap();
        let f = &report.pages[0].fields["nombre"];
        assert_eq!(f.group_ids, vec![1, 2]);
        let merged = f.assigned.unwrap();
        assert!((merged.x1 - 0.1).abs() < 1e-9);
        assert!((merged.x2 - 0.9).abs() < 1e-9);
    }

    #[test]
    fn store_loads_layouts_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let body = serde_json::json!({
            "document_type": "national id",
            "version": "1",
            "templates": [{
                "side": "front",
                "template": {
                    "nombre": {"x1": 0.1, "y1": 0.1, "x2": 0.5, "y2": 0.2,
                               "width": 0.4, "height": 0.1}
                }
            }]
        });
        let mut f = std::fs::File::create(dir.path().join("7_cedula.json")).unwrap();
        write!(f, "{body}").unwrap();
        // Unparseable file is skipped, not fatal.
        std::fs::write(dir.path().join("8_broken.json"), b"{").unwrap();

        let store = LayoutStore::from_dir(dir.path()).unwrap();
        assert_eq!(store.len(), 1);
        let layout = store.get(7).unwrap();
        assert_eq!(layout.document_key, "cedula");
        assert_eq!(layout.templates[0].side, "front");
        assert!(layout.templates[0].template.contains_key("nombre"));
    }

    #[test]
    fn build_template_inflates_and_rounds() {
        let groups = vec![group(1, 10, 10, 40, 30), group(2, 50, 10, 90, 30)];
        let mut field_groups = BTreeMap::new();
        field_groups.insert("nombre".to_string(), vec![1, 2]);
        field_groups.insert("ausente".to_string(), vec![9]);

        let template = build_template(&groups, (100, 100), &field_groups, 0.05);
        assert!(!template.contains_key("ausente"));
        let f = &template["nombre"];
        assert!((f.x1 - 0.05).abs() < 1e-9);
        assert!((f.y1 - 0.05).abs() < 1e-9);
        assert!((f.x2 - 0.95).abs() < 1e-9);
        assert!((f.y2 - 0.35).abs() < 1e-9);
        assert!((f.width - 0.9).abs() < 1e-9);
    }

    #[test]
    fn zero_margin_template_matches_group_bounds() {
        let groups = vec![group(1, 25, 50, 75, 100)];
        let mut field_groups = BTreeMap::new();
        field_groups.insert("foto".to_string(), vec![1]);

        let template = build_template(&groups, (100, 200), &field_groups, 0.0);
        let f = &template["foto"];
        assert_eq!((f.x1, f.y1, f.x2, f.y2), (0.25, 0.25, 0.75, 0.5));
    }
}
