//! Boosted Haar cascade model, read from OpenCV's `opencv-cascade-classifier`
//! XML format (as shipped in `haarcascade_frontalface_default.xml`).

use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

/// Stage thresholds are relaxed by this much so that windows sitting exactly
/// on the boundary pass.
const STAGE_THRESHOLD_EPS: f64 = 1e-5;

#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("failed to read cascade {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed cascade XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("cascade is missing <{0}>")]
    MissingElement(&'static str),
    #[error("invalid value in <{element}>: {value:?}")]
    InvalidValue { element: &'static str, value: String },
    #[error("unsupported cascade {kind}: {value}")]
    Unsupported { kind: &'static str, value: String },
    #[error("weak classifier references feature {index} but the cascade has {count}")]
    FeatureIndex { index: usize, count: usize },
    #[error("weak classifier references leaf {index} but has {count}")]
    LeafIndex { index: usize, count: usize },
    #[error("feature rectangle {0:?} lies outside the detection window")]
    RectOutsideWindow([u32; 4]),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeightedRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub weight: f64,
}

/// A Haar-like feature: a weighted sum of up to three rectangle sums.
#[derive(Clone, Debug, PartialEq)]
pub struct HaarFeature {
    pub rects: Vec<WeightedRect>,
}

/// A decision node. `left`/`right` > 0 index another node; values <= 0 name
/// leaf `-value`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TreeNode {
    pub left: i32,
    pub right: i32,
    pub feature: usize,
    pub threshold: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WeakClassifier {
    pub nodes: Vec<TreeNode>,
    pub leaves: Vec<f64>,
}

impl WeakClassifier {
    /// Walks the tree, taking the left branch while `feature_value(node) < node.threshold`.
    pub fn evaluate(&self, mut feature_value: impl FnMut(&TreeNode) -> f64) -> f64 {
        let mut idx = 0i32;
        loop {
            let node = &self.nodes[idx as usize];
            idx = if feature_value(node) < node.threshold {
                node.left
            } else {
                node.right
            };
            if idx <= 0 {
                return self.leaves[(-idx) as usize];
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Stage {
    /// Already relaxed by [`STAGE_THRESHOLD_EPS`].
    pub threshold: f64,
    pub classifiers: Vec<WeakClassifier>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HaarCascade {
    pub window_width: u32,
    pub window_height: u32,
    pub stages: Vec<Stage>,
    pub features: Vec<HaarFeature>,
}

impl HaarCascade {
    pub fn load(path: &Path) -> Result<Self, CascadeError> {
        let xml = std::fs::read_to_string(path).map_err(|source| CascadeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let cascade = Self::parse(&xml)?;
        log::info!(
            "Loaded cascade {} ({}x{} window, {} stages, {} features)",
            path.display(),
            cascade.window_width,
            cascade.window_height,
            cascade.stages.len(),
            cascade.features.len()
        );
        Ok(cascade)
    }

    /// Parses a cascade document:
    /// ```xml
    /// <opencv_storage>
    ///   <cascade type_id="opencv-cascade-classifier">
    ///     <stageType>BOOST</stageType>
    ///     <featureType>HAAR</featureType>
    ///     <height>24</height>
    ///     <width>24</width>
    ///     <stages>
    ///       <_>
    ///         <stageThreshold>-5.04</stageThreshold>
    ///         <weakClassifiers>
    ///           <_>
    ///             <internalNodes>0 -1 0 -3.15e-02</internalNodes>
    ///             <leafValues>2.08 -2.21</leafValues>
    ///           </_>
    ///         </weakClassifiers>
    ///       </_>
    ///     </stages>
    ///     <features>
    ///       <_><rects><_>6 4 12 9 -1.</_><_>6 7 12 3 3.</_></rects></_>
    ///     </features>
    ///   </cascade>
    /// </opencv_storage>
    /// ```
    pub fn parse(xml: &str) -> Result<Self, CascadeError> {
        let doc = roxmltree::Document::parse(xml)?;
        let cascade = doc
            .descendants()
            .find(|n| n.has_tag_name("cascade"))
            .ok_or(CascadeError::MissingElement("cascade"))?;

        if let Some(stage_type) = optional_text(&cascade, "stageType") {
            if stage_type != "BOOST" {
                return Err(CascadeError::Unsupported {
                    kind: "stage type",
                    value: stage_type.to_string(),
                });
            }
        }
        if let Some(feature_type) = optional_text(&cascade, "featureType") {
            if feature_type != "HAAR" {
                return Err(CascadeError::Unsupported {
                    kind: "feature type",
                    value: feature_type.to_string(),
                });
            }
        }

        let window_width: u32 = parse_child(&cascade, "width")?;
        let window_height: u32 = parse_child(&cascade, "height")?;
        // the variance window is inset by one pixel on each side
        if window_width < 3 || window_height < 3 {
            return Err(CascadeError::InvalidValue {
                element: "width",
                value: format!("{window_width}x{window_height}"),
            });
        }

        let features = child(&cascade, "features")?
            .children()
            .filter(|n| n.is_element())
            .map(|n| parse_feature(&n, window_width, window_height))
            .collect::<Result<Vec<_>, _>>()?;

        let stages = child(&cascade, "stages")?
            .children()
            .filter(|n| n.is_element())
            .map(|n| parse_stage(&n, features.len()))
            .collect::<Result<Vec<_>, _>>()?;

        if stages.is_empty() {
            return Err(CascadeError::MissingElement("stages"));
        }

        Ok(Self {
            window_width,
            window_height,
            stages,
            features,
        })
    }
}

fn child<'a, 'input>(
    node: &roxmltree::Node<'a, 'input>,
    name: &'static str,
) -> Result<roxmltree::Node<'a, 'input>, CascadeError> {
    node.children()
        .find(|n| n.has_tag_name(name))
        .ok_or(CascadeError::MissingElement(name))
}

fn optional_text<'a>(node: &roxmltree::Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.children()
        .find(|n| n.has_tag_name(name))
        .and_then(|n| n.text())
        .map(str::trim)
}

fn parse_child<T: FromStr>(node: &roxmltree::Node, name: &'static str) -> Result<T, CascadeError> {
    let text = child(node, name)?.text().unwrap_or("").trim();
    text.parse().map_err(|_| CascadeError::InvalidValue {
        element: name,
        value: text.to_string(),
    })
}

fn parse_numbers<T: FromStr>(node: &roxmltree::Node, name: &'static str) -> Result<Vec<T>, CascadeError> {
    let text = child(node, name)?.text().unwrap_or("");
    text.split_whitespace()
        .map(|tok| {
            tok.parse().map_err(|_| CascadeError::InvalidValue {
                element: name,
                value: tok.to_string(),
            })
        })
        .collect()
}

fn parse_feature(node: &roxmltree::Node, win_w: u32, win_h: u32) -> Result<HaarFeature, CascadeError> {
    if let Some(tilted) = optional_text(node, "tilted") {
        if tilted != "0" {
            return Err(CascadeError::Unsupported {
                kind: "feature",
                value: "tilted".to_string(),
            });
        }
    }

    let rects = child(node, "rects")?
        .children()
        .filter(|n| n.is_element())
        .map(|n| {
            let text = n.text().unwrap_or("");
            let values: Vec<f64> = text
                .split_whitespace()
                .map(|tok| tok.parse::<f64>())
                .collect::<Result<_, _>>()
                .map_err(|_| CascadeError::InvalidValue {
                    element: "rects",
                    value: text.trim().to_string(),
                })?;
            let &[x, y, w, h, weight] = values.as_slice() else {
                return Err(CascadeError::InvalidValue {
                    element: "rects",
                    value: text.trim().to_string(),
                });
            };
            let invalid = || CascadeError::InvalidValue {
                element: "rects",
                value: text.trim().to_string(),
            };
            let (x, y, width, height) = (
                coordinate(x).ok_or_else(invalid)?,
                coordinate(y).ok_or_else(invalid)?,
                coordinate(w).ok_or_else(invalid)?,
                coordinate(h).ok_or_else(invalid)?,
            );
            let fits = |start: u32, len: u32, limit: u32| {
                start.checked_add(len).is_some_and(|end| end <= limit)
            };
            if !fits(x, width, win_w) || !fits(y, height, win_h) {
                return Err(CascadeError::RectOutsideWindow([x, y, width, height]));
            }
            Ok(WeightedRect {
                x,
                y,
                width,
                height,
                weight,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(HaarFeature { rects })
}

/// A non-negative whole number that fits in `u32`.
fn coordinate(value: f64) -> Option<u32> {
    (value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64).then_some(value as u32)
}

fn parse_stage(node: &roxmltree::Node, feature_count: usize) -> Result<Stage, CascadeError> {
    let threshold: f64 = parse_child(node, "stageThreshold")?;
    let classifiers = child(node, "weakClassifiers")?
        .children()
        .filter(|n| n.is_element())
        .map(|n| parse_weak_classifier(&n, feature_count))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Stage {
        threshold: threshold - STAGE_THRESHOLD_EPS,
        classifiers,
    })
}

fn parse_weak_classifier(node: &roxmltree::Node, feature_count: usize) -> Result<WeakClassifier, CascadeError> {
    let raw: Vec<f64> = parse_numbers(node, "internalNodes")?;
    let leaves: Vec<f64> = parse_numbers(node, "leafValues")?;

    if raw.is_empty() || raw.len() % 4 != 0 {
        return Err(CascadeError::InvalidValue {
            element: "internalNodes",
            value: format!("{} values", raw.len()),
        });
    }

    let nodes: Vec<TreeNode> = raw
        .chunks_exact(4)
        .map(|c| TreeNode {
            left: c[0] as i32,
            right: c[1] as i32,
            feature: c[2] as usize,
            threshold: c[3],
        })
        .collect();

    for (index, node) in nodes.iter().enumerate() {
        if node.feature >= feature_count {
            return Err(CascadeError::FeatureIndex {
                index: node.feature,
                count: feature_count,
            });
        }
        for next in [node.left, node.right] {
            if next <= 0 {
                let leaf = (-next) as usize;
                if leaf >= leaves.len() {
                    return Err(CascadeError::LeafIndex {
                        index: leaf,
                        count: leaves.len(),
                    });
                }
            } else if next as usize >= nodes.len() || next as usize <= index {
                // children always follow their parent, so evaluation terminates
                return Err(CascadeError::InvalidValue {
                    element: "internalNodes",
                    value: format!("node {index} points to node {next}"),
                });
            }
        }
    }

    Ok(WeakClassifier { nodes, leaves })
}

/// A one-stage, one-stump cascade over a 4x4 window, for tests elsewhere in the crate.
#[cfg(test)]
pub(crate) const TINY_CASCADE_XML: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<cascade type_id="opencv-cascade-classifier">
  <stageType>BOOST</stageType>
  <featureType>HAAR</featureType>
  <height>4</height>
  <width>4</width>
  <stageNum>1</stageNum>
  <stages>
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>0.5</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            0 -1 0 0.1</internalNodes>
          <leafValues>
            -1. 1.</leafValues></_></weakClassifiers></_></stages>
  <features>
    <!-- bright left half, dark right half -->
    <_>
      <rects>
        <_>
          0 0 2 4 1.</_>
        <_>
          2 0 2 4 -1.</_></rects></_></features></cascade>
</opencv_storage>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;
    use tempfile::TempDir;

    #[test]
    fn test_parse_tiny_cascade() {
        let c = HaarCascade::parse(TINY_CASCADE_XML).unwrap();
        assert_eq!((c.window_width, c.window_height), (4, 4));
        assert_eq!(c.stages.len(), 1);
        assert_eq!(c.features.len(), 1);
        assert_eq!(c.features[0].rects.len(), 2);
        assert_eq!(c.features[0].rects[1].x, 2);
        assert_relative_eq!(c.features[0].rects[1].weight, -1.0);

        let stage = &c.stages[0];
        assert_relative_eq!(stage.threshold, 0.5 - STAGE_THRESHOLD_EPS);
        let weak = &stage.classifiers[0];
        assert_eq!(
            weak.nodes[0],
            TreeNode {
                left: 0,
                right: -1,
                feature: 0,
                threshold: 0.1
            }
        );
        assert_eq!(weak.leaves, vec![-1.0, 1.0]);
    }

    #[test]
    fn test_stump_evaluation_picks_leaf() {
        let c = HaarCascade::parse(TINY_CASCADE_XML).unwrap();
        let weak = &c.stages[0].classifiers[0];
        assert_relative_eq!(weak.evaluate(|_| 0.0), -1.0);
        assert_relative_eq!(weak.evaluate(|_| 0.5), 1.0);
    }

    #[test]
    fn test_two_level_tree_evaluation() {
        let weak = WeakClassifier {
            nodes: vec![
                TreeNode {
                    left: 1,
                    right: -2,
                    feature: 0,
                    threshold: 0.0,
                },
                TreeNode {
                    left: 0,
                    right: -1,
                    feature: 1,
                    threshold: 5.0,
                },
            ],
            leaves: vec![10.0, 20.0, 30.0],
        };
        let values = [-1.0, 7.0];
        assert_relative_eq!(weak.evaluate(|n| values[n.feature]), 20.0);
        assert_relative_eq!(weak.evaluate(|_| 1.0), 30.0);
    }

    #[test]
    fn test_load_missing_file() {
        let err = HaarCascade::load(Path::new("/nonexistent/cascade.xml")).unwrap_err();
        assert!(matches!(err, CascadeError::Io { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cascade.xml");
        std::fs::write(&path, TINY_CASCADE_XML).unwrap();
        assert!(HaarCascade::load(&path).is_ok());
    }

    #[test]
    fn test_not_xml() {
        assert!(matches!(
            HaarCascade::parse("not xml at all <"),
            Err(CascadeError::Xml(_))
        ));
    }

    #[test]
    fn test_missing_cascade_element() {
        let err = HaarCascade::parse("<opencv_storage/>").unwrap_err();
        assert!(matches!(err, CascadeError::MissingElement("cascade")));
    }

    #[test]
    fn test_lbp_cascade_rejected() {
        let xml = TINY_CASCADE_XML.replace("HAAR", "LBP");
        assert!(matches!(
            HaarCascade::parse(&xml),
            Err(CascadeError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_bad_feature_index_rejected() {
        let xml = TINY_CASCADE_XML.replace("0 -1 0 0.1", "0 -1 3 0.1");
        assert!(matches!(
            HaarCascade::parse(&xml),
            Err(CascadeError::FeatureIndex { index: 3, count: 1 })
        ));
    }

    #[test]
    fn test_bad_leaf_index_rejected() {
        let xml = TINY_CASCADE_XML.replace("0 -1 0 0.1", "0 -4 0 0.1");
        assert!(matches!(
            HaarCascade::parse(&xml),
            Err(CascadeError::LeafIndex { index: 4, count: 2 })
        ));
    }

    #[test]
    fn test_rect_outside_window_rejected() {
        let xml = TINY_CASCADE_XML.replace("2 0 2 4 -1.", "3 0 2 4 -1.");
        assert!(matches!(
            HaarCascade::parse(&xml),
            Err(CascadeError::RectOutsideWindow([3, 0, 2, 4]))
        ));
    }

    fn with_nodes(internal_nodes: &str) -> String {
        TINY_CASCADE_XML.replace(
            "0 -1 0 0.1</internalNodes>",
            &format!("{internal_nodes}</internalNodes>"),
        )
    }

    #[test]
    fn test_forward_child_accepted() {
        let c = HaarCascade::parse(&with_nodes("1 -1 0 0.1 0 -1 0 0.2")).unwrap();
        assert_eq!(c.stages[0].classifiers[0].nodes.len(), 2);
    }

    #[rstest]
    #[case::self_loop("1 -1 0 0.1 1 -1 0 0.2")]
    #[case::back_edge("2 -1 0 0.1 0 -1 0 0.2 1 -1 0 0.3")]
    fn test_cyclic_tree_rejected(#[case] internal_nodes: &str) {
        assert!(matches!(
            HaarCascade::parse(&with_nodes(internal_nodes)),
            Err(CascadeError::InvalidValue {
                element: "internalNodes",
                ..
            })
        ));
    }

    #[rstest]
    #[case::negative_x("-1 0 2 4 -1.")]
    #[case::fractional_width("2 0 1.5 4 -1.")]
    #[case::overflowing_width("2 0 4294967295 4 -1.")]
    fn test_bad_rect_coordinates_rejected(#[case] rect: &str) {
        let xml = TINY_CASCADE_XML.replace("2 0 2 4 -1.", rect);
        assert!(HaarCascade::parse(&xml).is_err());
    }

    #[test]
    fn test_malformed_number_rejected() {
        let xml = TINY_CASCADE_XML.replace("<stageThreshold>0.5", "<stageThreshold>abc");
        assert!(matches!(
            HaarCascade::parse(&xml),
            Err(CascadeError::InvalidValue {
                element: "stageThreshold",
                ..
            })
        ));
    }
}
