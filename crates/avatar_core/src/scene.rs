//! A capability-tagged scene graph for loaded avatars.
//!
//! Assets are stored as a flat arena of nodes. Each node is either a bone, a
//! surface carrying morph targets, or something we don't care about.

use std::collections::HashMap;

use tracing::trace;

use crate::error::SceneError;
use crate::expression::RetargetedFrame;
use crate::pose::Placement;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Something that exposes named morph targets and a parallel array of
/// influence weights.
pub trait MorphSurface {
    fn target_index(&self, name: &str) -> Option<usize>;
    fn influences_mut(&mut self) -> &mut [f32];
}

/// Writes every weight in `frame` whose name the surface knows. Unknown names
/// are skipped. Returns the number of influences written.
pub fn apply_expressions<S: MorphSurface + ?Sized>(surface: &mut S, frame: &RetargetedFrame) -> usize {
    let mut written = 0;
    for (name, weight) in frame.iter() {
        let Some(index) = surface.target_index(name) else {
            continue;
        };
        let influences = surface.influences_mut();
        if let Some(slot) = influences.get_mut(index) {
            *slot = weight;
            written += 1;
        }
    }
    written
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MorphTargets {
    dictionary: HashMap<String, usize>,
    influences: Vec<f32>,
}

impl MorphTargets {
    /// Targets indexed in the order given, all influences at zero.
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        let dictionary: HashMap<String, usize> = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name.into(), i))
            .collect();
        let len = dictionary.values().map(|i| i + 1).max().unwrap_or(0);
        Self {
            dictionary,
            influences: vec![0.0; len],
        }
    }

    pub fn from_parts(
        dictionary: HashMap<String, usize>,
        influences: Vec<f32>,
    ) -> Result<Self, SceneError> {
        if let Some((name, index)) = dictionary.iter().find(|(_, i)| **i >= influences.len()) {
            return Err(SceneError::MorphIndexOutOfRange {
                name: name.clone(),
                index: *index,
                len: influences.len(),
            });
        }
        Ok(Self {
            dictionary,
            influences,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.dictionary.is_empty() || self.influences.is_empty()
    }

    pub fn influences(&self) -> &[f32] {
        &self.influences
    }

    pub fn influence(&self, name: &str) -> Option<f32> {
        self.dictionary.get(name).map(|i| self.influences[*i])
    }
}

impl MorphSurface for MorphTargets {
    fn target_index(&self, name: &str) -> Option<usize> {
        self.dictionary.get(name).copied()
    }

    fn influences_mut(&mut self) -> &mut [f32] {
        &mut self.influences
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Bone,
    MorphableSurface(MorphTargets),
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub name: Option<String>,
    pub kind: NodeKind,
    pub placement: Placement,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl SceneNode {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// A texture handed back by the asset collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Texture {
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Material {
    pub name: String,
    pub base_color_texture: Option<String>,
    /// Bumped whenever the material has to be re-uploaded.
    pub version: u32,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_color_texture: None,
            version: 0,
        }
    }
}

pub trait SceneVisitor {
    fn visit_bone(&mut self, _id: NodeId, _node: &SceneNode) {}
    fn visit_surface(&mut self, _id: NodeId, _node: &SceneNode, _targets: &MorphTargets) {}
    fn visit_other(&mut self, _id: NodeId, _node: &SceneNode) {}
}

/// Collects every surface with at least one usable morph target.
#[derive(Debug, Default)]
pub struct SurfaceCollector {
    pub surfaces: Vec<NodeId>,
}

impl SceneVisitor for SurfaceCollector {
    fn visit_surface(&mut self, id: NodeId, _node: &SceneNode, targets: &MorphTargets) {
        if !targets.is_empty() {
            self.surfaces.push(id);
        }
    }
}

/// Finds the first bone in traversal order.
#[derive(Debug, Default)]
pub struct FirstBone {
    pub bone: Option<NodeId>,
}

impl SceneVisitor for FirstBone {
    fn visit_bone(&mut self, id: NodeId, _node: &SceneNode) {
        self.bone.get_or_insert(id);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AvatarAsset {
    nodes: Vec<SceneNode>,
    roots: Vec<NodeId>,
    materials: Vec<Material>,
    pub placement: Placement,
}

impl AvatarAsset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(
        &mut self,
        parent: Option<NodeId>,
        name: impl Into<String>,
        kind: NodeKind,
    ) -> Result<NodeId, SceneError> {
        let id = NodeId(self.nodes.len());
        match parent {
            Some(parent) => self
                .nodes
                .get_mut(parent.0)
                .ok_or(SceneError::UnknownParent(parent.0))?
                .children
                .push(id),
            None => self.roots.push(id),
        }
        self.nodes.push(SceneNode {
            name: Some(name.into()),
            kind,
            placement: Placement::default(),
            parent,
            children: Vec::new(),
        });
        Ok(id)
    }

    pub fn add_material(&mut self, material: Material) {
        self.materials.push(material);
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id.0)
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.name.as_deref() == Some(name))
            .map(NodeId)
    }

    pub fn morph_targets_mut(&mut self, id: NodeId) -> Option<&mut MorphTargets> {
        match &mut self.nodes.get_mut(id.0)?.kind {
            NodeKind::MorphableSurface(targets) => Some(targets),
            _ => None,
        }
    }

    /// Placement of node `id`, or of the asset itself when `id` is `None`.
    pub fn placement(&self, id: Option<NodeId>) -> &Placement {
        match id.filter(|id| id.0 < self.nodes.len()) {
            Some(id) => &self.nodes[id.0].placement,
            None => &self.placement,
        }
    }

    pub fn placement_mut(&mut self, id: Option<NodeId>) -> &mut Placement {
        match id.filter(|id| id.0 < self.nodes.len()) {
            Some(id) => &mut self.nodes[id.0].placement,
            None => &mut self.placement,
        }
    }

    pub fn refresh(&mut self) {
        self.placement.refresh();
        for node in &mut self.nodes {
            node.placement.refresh();
        }
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Depth-first, parents before children, roots in insertion order.
    pub fn accept<V: SceneVisitor + ?Sized>(&self, visitor: &mut V) {
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.0];
            match &node.kind {
                NodeKind::Bone => visitor.visit_bone(id, node),
                NodeKind::MorphableSurface(targets) => visitor.visit_surface(id, node, targets),
                NodeKind::Other => visitor.visit_other(id, node),
            }
            stack.extend(node.children.iter().rev().copied());
        }
    }

    /// Points every material at `texture` and marks it for re-upload.
    pub fn apply_texture(&mut self, texture: &Texture) {
        for material in &mut self.materials {
            trace!(material = %material.name, texture = %texture.source, "apply texture");
            material.base_color_texture = Some(texture.source.clone());
            material.version += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::ExpressionFrame;
    use crate::gain::GainTable;
    use crate::retarget::retarget;

    fn head() -> AvatarAsset {
        let mut asset = AvatarAsset::new();
        let armature = asset.add_node(None, "Armature", NodeKind::Other).unwrap();
        asset.add_node(Some(armature), "root", NodeKind::Bone).unwrap();
        asset
            .add_node(
                Some(armature),
                "Head",
                NodeKind::MorphableSurface(MorphTargets::new(["jawOpen", "eyeBlinkLeft"])),
            )
            .unwrap();
        asset
            .add_node(
                Some(armature),
                "Teeth",
                NodeKind::MorphableSurface(MorphTargets::new(["jawOpen"])),
            )
            .unwrap();
        asset
            .add_node(None, "Props", NodeKind::MorphableSurface(MorphTargets::default()))
            .unwrap();
        asset
    }

    #[test]
    fn traversal_collects_surfaces_in_order() {
        let asset = head();
        let mut surfaces = SurfaceCollector::default();
        asset.accept(&mut surfaces);
        assert_eq!(surfaces.surfaces, vec![asset.find("Head").unwrap(), asset.find("Teeth").unwrap()]);

        let mut bone = FirstBone::default();
        asset.accept(&mut bone);
        assert_eq!(bone.bone, asset.find("root"));
    }

    #[test]
    fn apply_skips_unknown_names() {
        let mut targets = MorphTargets::new(["jawOpen", "eyeBlinkLeft"]);
        let frame: ExpressionFrame = [("jawOpen", 0.5), ("tongueOut", 0.7)].into_iter().collect();
        let written = apply_expressions(&mut targets, &retarget(&frame, &GainTable::uniform(1.0)));
        assert_eq!(written, 1);
        assert_eq!(targets.influence("jawOpen"), Some(0.5));
        assert_eq!(targets.influence("eyeBlinkLeft"), Some(0.0));
        assert_eq!(targets.influence("tongueOut"), None);
    }

    #[test]
    fn from_parts_checks_indices() {
        let dictionary = HashMap::from([("jawOpen".to_string(), 3)]);
        assert_eq!(
            MorphTargets::from_parts(dictionary.clone(), vec![0.0; 2]),
            Err(SceneError::MorphIndexOutOfRange {
                name: "jawOpen".into(),
                index: 3,
                len: 2
            })
        );
        assert!(MorphTargets::from_parts(dictionary, vec![0.0; 4]).is_ok());
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let mut asset = AvatarAsset::new();
        assert_eq!(
            asset.add_node(Some(NodeId(4)), "orphan", NodeKind::Other),
            Err(SceneError::UnknownParent(4))
        );
        assert!(asset.is_empty());
    }

    #[test]
    fn texture_bumps_every_material() {
        let mut asset = head();
        asset.add_material(Material::new("Skin"));
        asset.add_material(Material::new("Eyes"));
        asset.apply_texture(&Texture {
            source: "skin.png".into(),
        });
        assert!(asset
            .materials()
            .iter()
            .all(|m| m.version == 1 && m.base_color_texture.as_deref() == Some("skin.png")));
    }
}
