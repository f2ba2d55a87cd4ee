//! Output scene: one terrain mesh, one road ribbon, zero or more buildings.
//! Serialized to JSON for the upload collaborator to pick up.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::Serialize;

use crate::error::Result;
use crate::mesh::Mesh;

#[derive(Debug, Serialize)]
pub struct Scene {
    pub units: String,
    pub terrain: Mesh,
    pub ribbon: Mesh,
    pub buildings: Vec<Mesh>,
}

impl Scene {
    pub fn new(terrain: Mesh, ribbon: Mesh, buildings: Vec<Mesh>) -> Self {
        Self {
            units: "m".to_owned(),
            terrain,
            ribbon,
            buildings,
        }
    }

    pub fn mesh_count(&self) -> usize {
        2 + self.buildings.len()
    }

    /// Check the face-list invariant on every mesh in the scene.
    pub fn validate(&self) -> Result<()> {
        self.terrain.validate()?;
        self.ribbon.validate()?;
        for building in &self.buildings {
            building.validate()?;
        }
        Ok(())
    }
}

pub fn write_scene(scene: &Scene, path: impl AsRef<Path>) -> Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer(writer, scene).map_err(|e| std::io::Error::other(e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Color;

    fn triangle_mesh() -> Mesh {
        let mut mesh = Mesh::default();
        mesh.push_face(
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            &[Color::from_rgb(10, 20, 30); 3],
        );
        mesh
    }

    #[test]
    fn scene_serializes_with_flat_lists() {
        let scene = Scene::new(triangle_mesh(), triangle_mesh(), vec![triangle_mesh()]);
        scene.validate().unwrap();
        let json = serde_json::to_value(&scene).unwrap();
        assert_eq!(json["units"], "m");
        assert_eq!(json["terrain"]["faces"][0], 3);
        assert_eq!(
            json["terrain"]["vertices"].as_array().unwrap().len(),
            9
        );
        assert_eq!(json["buildings"].as_array().unwrap().len(), 1);
        // colors serialize as packed integers
        assert_eq!(
            json["ribbon"]["colors"][0],
            Color::from_rgb(10, 20, 30).0
        );
    }

    #[test]
    fn write_scene_produces_readable_json() {
        let scene = Scene::new(triangle_mesh(), triangle_mesh(), Vec::new());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.json");
        write_scene(&scene, &path).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["terrain"]["units"], "m");
    }
}
