//! Annotation store: imageId -> annotationId -> Annotation, guarded by a
//! per-source permission table and per-image/per-tool/per-source caps, notifying change
//! callbacks after every mutation.

use std::collections::HashMap;

use crate::annotation::measurement::DicomMode;
use crate::error::{CoreError, CoreResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AnnotationSource {
    User,
    Ai,
    Server,
}

/// What a mutation may do to an annotation of a given source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Permissions {
    pub deletable: bool,
    pub editable: bool,
    pub countable: bool,
    pub hideable: bool,
}

fn permissions_for(source: AnnotationSource) -> Permissions {
    match source {
        AnnotationSource::User => Permissions {
            deletable: true,
            editable: true,
            countable: true,
            hideable: true,
        },
        AnnotationSource::Ai => Permissions {
            deletable: true,
            editable: false,
            countable: true,
            hideable: true,
        },
        AnnotationSource::Server => Permissions {
            deletable: false,
            editable: false,
            countable: true,
            hideable: false,
        },
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    pub id: String,
    pub image_id: String,
    pub frame_index: usize,
    pub tool_type: String,
    pub mode: DicomMode,
    /// DICOM pixel coordinates; canvas coordinates never reach storage.
    pub points: Vec<(i64, i64)>,
    pub measured_value: Option<f64>,
    pub unit: Option<String>,
    pub display: Option<String>,
    pub label_point: Option<(i64, i64)>,
    pub color: String,
    pub visible: bool,
    pub source: AnnotationSource,
    pub deletable: bool,
    pub editable: bool,
    pub created_at_ms: f64,
    pub updated_at_ms: f64,
    pub custom_fields: HashMap<String, String>,
}

impl Annotation {
    /// Stamps `deletable`/`editable` from the permission table; callers should not set
    /// these fields directly on a freshly-created annotation.
    pub fn new(
        id: impl Into<String>,
        image_id: impl Into<String>,
        frame_index: usize,
        tool_type: impl Into<String>,
        mode: DicomMode,
        points: Vec<(i64, i64)>,
        source: AnnotationSource,
        now_ms: f64,
    ) -> Self {
        let perms = permissions_for(source);
        Annotation {
            id: id.into(),
            image_id: image_id.into(),
            frame_index,
            tool_type: tool_type.into(),
            mode,
            points,
            measured_value: None,
            unit: None,
            display: None,
            label_point: None,
            color: "#ffff00".into(),
            visible: true,
            source,
            deletable: perms.deletable,
            editable: perms.editable,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            custom_fields: HashMap::new(),
        }
    }
}

/// Cap configuration for countable annotations.
#[derive(Clone, Debug, PartialEq)]
pub struct Caps {
    pub per_image: usize,
    pub per_tool: Option<usize>,
    pub per_source: Option<usize>,
}

/// Invoked synchronously, on the caller's thread, after every mutation with the full
/// updated list for the affected image.
pub trait ChangeCallback {
    fn on_change(&mut self, image_id: &str, annotations: &[Annotation]);
}

pub struct AnnotationStore {
    by_image: HashMap<String, HashMap<String, Annotation>>,
    caps: Caps,
}

impl AnnotationStore {
    pub fn new(caps: Caps) -> Self {
        AnnotationStore {
            by_image: HashMap::new(),
            caps,
        }
    }

    fn countable_count(&self, image_id: &str, tool_type: Option<&str>, source: Option<AnnotationSource>) -> usize {
        self.by_image
            .get(image_id)
            .map(|annotations| {
                annotations
                    .values()
                    .filter(|a| permissions_for(a.source).countable)
                    .filter(|a| tool_type.map_or(true, |t| a.tool_type == t))
                    .filter(|a| source.map_or(true, |s| a.source == s))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Evaluates caps and permissions, then inserts. Returns `cap-exceeded` if any
    /// configured cap would be violated by a countable annotation.
    pub fn create(&mut self, annotation: Annotation, callback: &mut dyn ChangeCallback) -> CoreResult<()> {
        let perms = permissions_for(annotation.source);
        if perms.countable {
            if self.countable_count(&annotation.image_id, None, None) >= self.caps.per_image {
                return Err(CoreError::CapExceeded {
                    scope: format!("image {}", annotation.image_id),
                });
            }
            if let Some(tool_cap) = self.caps.per_tool {
                if self.countable_count(&annotation.image_id, Some(&annotation.tool_type), None) >= tool_cap {
                    return Err(CoreError::CapExceeded {
                        scope: format!("tool {}", annotation.tool_type),
                    });
                }
            }
            if let Some(source_cap) = self.caps.per_source {
                if self.countable_count(&annotation.image_id, None, Some(annotation.source)) >= source_cap {
                    return Err(CoreError::CapExceeded {
                        scope: format!("source {:?}", annotation.source),
                    });
                }
            }
        }
        let image_id = annotation.image_id.clone();
        self.force_write(annotation);
        self.notify(&image_id, callback);
        Ok(())
    }

    /// Bypasses caps and permissions; reserved for history replay.
    pub fn force_write(&mut self, annotation: Annotation) {
        self.by_image
            .entry(annotation.image_id.clone())
            .or_default()
            .insert(annotation.id.clone(), annotation);
    }

    pub fn update(
        &mut self,
        image_id: &str,
        annotation_id: &str,
        now_ms: f64,
        mutate: impl FnOnce(&mut Annotation),
        callback: &mut dyn ChangeCallback,
    ) -> CoreResult<()> {
        let editable = self
            .by_image
            .get(image_id)
            .and_then(|m| m.get(annotation_id))
            .map(|a| a.editable)
            .ok_or_else(|| CoreError::PermissionDenied {
                annotation_id: annotation_id.to_string(),
                action: "editable",
            })?;
        if !editable {
            return Err(CoreError::PermissionDenied {
                annotation_id: annotation_id.to_string(),
                action: "editable",
            });
        }
        if let Some(a) = self.by_image.get_mut(image_id).and_then(|m| m.get_mut(annotation_id)) {
            mutate(a);
            a.updated_at_ms = now_ms;
        }
        self.notify(image_id, callback);
        Ok(())
    }

    pub fn delete(&mut self, image_id: &str, annotation_id: &str, callback: &mut dyn ChangeCallback) -> CoreResult<()> {
        let deletable = self
            .by_image
            .get(image_id)
            .and_then(|m| m.get(annotation_id))
            .map(|a| a.deletable)
            .ok_or_else(|| CoreError::PermissionDenied {
                annotation_id: annotation_id.to_string(),
                action: "deletable",
            })?;
        if !deletable {
            return Err(CoreError::PermissionDenied {
                annotation_id: annotation_id.to_string(),
                action: "deletable",
            });
        }
        self.force_delete(image_id, annotation_id);
        self.notify(image_id, callback);
        Ok(())
    }

    /// Bypasses permissions; reserved for history replay.
    pub fn force_delete(&mut self, image_id: &str, annotation_id: &str) {
        if let Some(map) = self.by_image.get_mut(image_id) {
            map.remove(annotation_id);
        }
    }

    pub fn list(&self, image_id: &str) -> Vec<Annotation> {
        self.by_image
            .get(image_id)
            .map(|m| {
                let mut v: Vec<Annotation> = m.values().cloned().collect();
                v.sort_by(|a, b| a.id.cmp(&b.id));
                v
            })
            .unwrap_or_default()
    }

    pub fn visible(&self, image_id: &str) -> Vec<Annotation> {
        self.list(image_id).into_iter().filter(|a| a.visible).collect()
    }

    fn notify(&self, image_id: &str, callback: &mut dyn ChangeCallback) {
        callback.on_change(image_id, &self.list(image_id));
    }
}
