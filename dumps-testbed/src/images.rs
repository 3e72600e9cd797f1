use anyhow::{Context, Result};
use log::{info, warn};
use std::{collections::BTreeMap as Map, fs};

use crate::{
    artifacts::{self, Credentials},
    components::{
        in_scope, is_base_tag, is_final_tag, is_final_tag_of, ComponentDescriptor,
        ComponentType, COMPONENTS, FOUNDATION_IMAGE, FOUNDATION_RECIPE,
    },
    config::Invocation,
    error::Error,
    labels::{has_labels, ownership_label, resource_labels},
    models::{Image, ImageBuildSpec, ImageTag, Labels},
    networks::{network_name, NetworkAllocator},
    report,
    services::ContainerBackend,
};

const SET_BUILD_ARG: &str = "SETNAME";

/// Where the primary database image picks up dumps to import for a set.
const IMPORTS_DIR: &str = "mariadb/imports";

fn owned(image: &Image) -> bool {
    has_labels(&image.labels, &ownership_label())
}

fn tag_in(images: &[Image], tag: &ImageTag) -> bool {
    images
        .iter()
        .any(|image| owned(image) && image.tags.contains(tag))
}

/// Builds and removes the foundation, base and final images.
pub struct ImageLifecycle<'a> {
    backend: &'a mut dyn ContainerBackend,
    invocation: Invocation<'a>,
}

impl<'a> ImageLifecycle<'a> {
    pub fn new(
        backend: &'a mut dyn ContainerBackend,
        invocation: Invocation<'a>,
    ) -> ImageLifecycle<'a> {
        ImageLifecycle {
            backend,
            invocation,
        }
    }

    /// Asks the runtime every time; builds in between change the answer.
    pub fn image_exists(&mut self, tag: &ImageTag) -> Result<bool> {
        let images = self.backend.list_images()?;
        Ok(tag_in(&images, tag))
    }

    fn has_recipe(&self, recipe: &str) -> bool {
        self.invocation.context.join(recipe).is_file()
    }

    fn build(
        &mut self,
        tag: ImageTag,
        recipe: String,
        labels: Labels,
        build_args: Map<String, String>,
    ) -> Result<()> {
        info!("building image {} from {}", tag, recipe);

        self.backend.build_image(ImageBuildSpec {
            tag,
            context: self.invocation.context.to_path_buf(),
            dockerfile: recipe,
            labels,
            build_args,
            squash: self.invocation.config.squash,
        })?;

        Ok(())
    }

    /// The image every base image starts from. Without its recipe nothing
    /// can be built.
    pub fn ensure_foundation(&mut self) -> Result<()> {
        let tag = ImageTag(FOUNDATION_IMAGE.into());
        if self.image_exists(&tag)? {
            info!("image {} already exists", tag);
            return Ok(());
        }

        if !self.has_recipe(FOUNDATION_RECIPE) {
            let path = self.invocation.context.join(FOUNDATION_RECIPE);
            return Err(Error::MissingRecipe(path).into());
        }

        self.build(tag, FOUNDATION_RECIPE.into(), ownership_label(), Map::new())
            .context("building the foundation image")
    }

    fn skip_missing_recipe(&self, descriptor: &ComponentDescriptor, recipe: &str) -> bool {
        if self.has_recipe(recipe) {
            return false;
        }

        warn!("no recipe {} for {}", recipe, descriptor.kind);
        report::warning(&format!(
            "skipping {} image, {} is not available yet",
            descriptor.kind, recipe
        ));
        true
    }

    pub fn ensure_base_build(&mut self, set: &str, filter: Option<ComponentType>) -> Result<()> {
        self.ensure_foundation()?;

        let config = self.invocation.config;
        let set_config = config.set(set)?;

        for descriptor in in_scope(filter) {
            if !set_config.enabled(descriptor.kind) {
                continue;
            }

            let tag = descriptor.base_image();
            if self.image_exists(&tag)? {
                info!("image {} already exists", tag);
                continue;
            }

            let recipe = descriptor.base_recipe();
            if self.skip_missing_recipe(descriptor, &recipe) {
                continue;
            }

            self.build(tag, recipe, ownership_label(), Map::new())
                .with_context(|| format!("building the {} base image", descriptor.kind))?;
        }

        Ok(())
    }

    /// Writes the container list and credentials for `set` into the build
    /// context. Under dry-run they are assembled but not written.
    fn write_artifacts(&mut self, set: &str) -> Result<()> {
        let config = self.invocation.config;
        let set_config = config.set(set)?;

        let names = artifacts::container_list(set, set_config, &network_name(set));
        let credentials = Credentials::assemble(set, set_config, config.global.as_ref())?;

        let list_path = artifacts::container_list_path(self.invocation.context, set);
        let credentials_path = artifacts::credentials_path(self.invocation.context, set);

        if self.invocation.dry_run {
            report::would(&format!("write {}", list_path.display()));
            report::would(&format!("write {}", credentials_path.display()));
            return Ok(());
        }

        artifacts::write_container_list(&list_path, &names)
            .with_context(|| format!("writing {}", list_path.display()))?;
        credentials
            .write(&credentials_path)
            .with_context(|| format!("writing {}", credentials_path.display()))?;

        Ok(())
    }

    fn ensure_imports_dir(&mut self, set: &str) -> Result<()> {
        let dir = self.invocation.context.join(IMPORTS_DIR).join(set);
        if dir.is_dir() {
            return Ok(());
        }

        report::warning(&format!(
            "no database imports for set {}, the primary database starts empty",
            set
        ));

        if self.invocation.dry_run {
            report::would(&format!("create directory {}", dir.display()));
            return Ok(());
        }

        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        Ok(())
    }

    pub fn ensure_final_build(&mut self, set: &str, filter: Option<ComponentType>) -> Result<()> {
        self.ensure_base_build(set, filter)?;
        self.write_artifacts(set)?;

        let config = self.invocation.config;
        let set_config = config.set(set)?;

        for descriptor in in_scope(filter) {
            if !set_config.enabled(descriptor.kind) {
                continue;
            }

            if descriptor.kind == ComponentType::DbPrimary {
                self.ensure_imports_dir(set)?;
            }

            let tag = descriptor.final_image(set);
            if self.image_exists(&tag)? {
                info!("image {} already exists", tag);
                continue;
            }

            let recipe = descriptor.final_recipe();
            if self.skip_missing_recipe(descriptor, &recipe) {
                continue;
            }

            let mut build_args = Map::new();
            build_args.insert(SET_BUILD_ARG.to_string(), set.to_string());

            self.build(tag, recipe, resource_labels(set), build_args)
                .with_context(|| {
                    format!("building the {} image for set {}", descriptor.kind, set)
                })?;
        }

        Ok(())
    }

    fn remove_tags(&mut self, tags: &[ImageTag]) -> Result<()> {
        for tag in tags.iter() {
            info!("removing image {}", tag);
            self.backend.remove_image(tag)?;
        }

        Ok(())
    }

    /// Tags of owned images matching `wanted`, each listed once.
    fn owned_tags(&mut self, wanted: impl Fn(&ImageTag) -> bool) -> Result<Vec<ImageTag>> {
        let mut tags = self
            .backend
            .list_images()?
            .into_iter()
            .filter(owned)
            .flat_map(|image| image.tags.into_iter())
            .filter(|tag| wanted(tag))
            .collect::<Vec<_>>();
        tags.sort();
        tags.dedup();

        Ok(tags)
    }

    /// Removes the set's final images. Without a filter the set's network
    /// goes too, along with `network` if given.
    pub fn remove_final(
        &mut self,
        set: &str,
        filter: Option<ComponentType>,
        network: Option<&str>,
    ) -> Result<()> {
        if filter.is_none() {
            let removed =
                NetworkAllocator::new(&mut *self.backend).remove_set_networks(set, network)?;
            info!("removed {} networks for set {}", removed, set);
        }

        let images = self.backend.list_images()?;
        let doomed = in_scope(filter)
            .map(|descriptor| descriptor.final_image(set))
            .filter(|tag| tag_in(&images, tag))
            .collect::<Vec<_>>();

        if doomed.is_empty() {
            report::info(&format!("no final images to remove for set {}", set));
            return Ok(());
        }

        self.remove_tags(&doomed)
    }

    /// With a filter, removes that component's base image. Otherwise removes
    /// the owned networks, then every final image, then the base images.
    /// Containers must already be gone.
    pub fn purge(&mut self, filter: Option<ComponentType>) -> Result<()> {
        let doomed = match filter {
            Some(kind) => {
                let tag = kind.descriptor().base_image();
                if self.image_exists(&tag)? {
                    vec![tag]
                } else {
                    Vec::new()
                }
            }
            None => {
                let removed =
                    NetworkAllocator::new(&mut *self.backend).remove_labelled(&ownership_label())?;
                info!("removed {} networks", removed);

                let finals = self.owned_tags(is_final_tag)?;
                self.remove_tags(&finals)?;

                let images = self.backend.list_images()?;
                COMPONENTS
                    .iter()
                    .map(|descriptor| descriptor.base_image())
                    .filter(|tag| tag_in(&images, tag))
                    .collect()
            }
        };

        if doomed.is_empty() {
            report::info("no base images to remove");
            return Ok(());
        }

        self.remove_tags(&doomed)
    }

    pub fn purge_all(&mut self) -> Result<()> {
        self.purge(None)?;

        let tag = ImageTag(FOUNDATION_IMAGE.into());
        if self.image_exists(&tag)? {
            self.remove_tags(&[tag])?;
        } else {
            report::info("no foundation image to remove");
        }

        Ok(())
    }

    /// Owned, tagged images: everything, or the base images plus the final
    /// images of `set`.
    pub fn list(&mut self, set: Option<&str>) -> Result<Vec<(ImageTag, Image)>> {
        let images = self.backend.list_images()?;

        let listed = images
            .into_iter()
            .filter(owned)
            .flat_map(|image| {
                image
                    .tags
                    .clone()
                    .into_iter()
                    .map(move |tag| (tag, image.clone()))
            })
            .filter(|(tag, _)| match set {
                Some(set) => is_base_tag(tag) || is_final_tag_of(tag, set),
                None => true,
            })
            .collect();

        Ok(listed)
    }
}
