use std::sync::Arc;

use bytes::Bytes;
use poem::Result;
use poem_openapi::param::Path;
use poem_openapi::payload::{Binary, Json};
use poem_openapi::types::multipart::Upload;
use poem_openapi::{ApiResponse, Multipart, Object, OpenApi};

use crate::controller::{picture_url, PictureController};
use crate::database::{ProfilePicture, User, UserRepository};
use crate::error::PicsError;

#[derive(Debug, Object)]
pub struct CreateUserPayload {
    /// The display name of the new user, it does not need to be unique.
    pub username: String,
}

#[derive(Debug, Object)]
#[oai(rename_all = "camelCase")]
pub struct UserInfo {
    /// The generated ID of the user.
    pub user_id: String,

    pub username: String,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            user_id: user.user_id,
            username: user.username,
        }
    }
}

#[derive(Debug, Object)]
#[oai(rename_all = "camelCase")]
pub struct UserDetails {
    pub user_id: String,

    pub username: String,

    /// The urls of every profile picture the user has uploaded.
    pub profile_pics: Vec<String>,
}

#[derive(Debug, Object)]
#[oai(rename_all = "camelCase")]
pub struct PictureInfo {
    /// The generated ID of the picture.
    ///
    /// This is used to access the picture under its owner.
    pub id: i64,

    /// Where the storage backend placed the upload.
    pub file_path: String,

    pub user_id: String,
}

impl From<ProfilePicture> for PictureInfo {
    fn from(picture: ProfilePicture) -> Self {
        Self {
            id: picture.id,
            file_path: picture.storage_reference,
            user_id: picture.owner_id,
        }
    }
}

#[derive(Multipart)]
pub struct PictureUpload {
    #[oai(rename = "profilePic")]
    profile_pic: Upload,
}

#[derive(ApiResponse)]
pub enum UserCreated {
    /// The user was created.
    #[oai(status = 201)]
    Created(Json<UserInfo>),
}

#[derive(ApiResponse)]
pub enum PictureCreated {
    /// The picture was stored, the `Location` header points at it.
    #[oai(status = 201)]
    Created(Json<PictureInfo>, #[oai(header = "Location")] String),
}

#[derive(ApiResponse)]
pub enum Deleted {
    #[oai(status = 204)]
    NoContent,
}

pub struct PicsApi {
    users: UserRepository,
    pictures: Arc<PictureController>,
}

impl PicsApi {
    pub fn new(users: UserRepository, pictures: Arc<PictureController>) -> Self {
        Self { users, pictures }
    }
}

#[OpenApi]
impl PicsApi {
    /// Create User
    #[oai(path = "/users", method = "post")]
    pub async fn create_user(&self, payload: Json<CreateUserPayload>) -> Result<UserCreated> {
        let username = payload.0.username;
        if username.trim().is_empty() {
            return Err(PicsError::Validation("username must not be empty".to_string()).into());
        }

        let user = self.users.create(&username).await?;
        Ok(UserCreated::Created(Json(user.into())))
    }

    /// Get User
    ///
    /// Returns the user along with the urls of their profile pictures.
    #[oai(path = "/users/:user_id", method = "get")]
    pub async fn get_user(&self, user_id: Path<String>) -> Result<Json<UserDetails>> {
        let user = self.users.get(&user_id.0).await?;
        let profile_pics = self
            .pictures
            .list(&user.user_id)
            .await?
            .iter()
            .map(|picture| picture_url(&user.user_id, picture.id))
            .collect();

        Ok(Json(UserDetails {
            user_id: user.user_id,
            username: user.username,
            profile_pics,
        }))
    }

    /// Delete User
    ///
    /// Every profile picture of the user is removed first. Pictures whose
    /// stored content has already disappeared are dropped along the way.
    #[oai(path = "/users/:user_id", method = "delete")]
    pub async fn delete_user(&self, user_id: Path<String>) -> Result<Deleted> {
        let user = self.users.get(&user_id.0).await?;

        let removed = self.pictures.delete_all_for(&user.user_id).await?;
        self.users.delete(&user.user_id).await?;

        info!("Deleted user {} and {} pictures", &user.user_id, removed);
        Ok(Deleted::NoContent)
    }

    /// Upload Profile Picture
    ///
    /// Takes a multipart form with the image in the `profilePic` field.
    #[oai(path = "/users/:user_id/profile_pic", method = "post")]
    pub async fn upload_picture(
        &self,
        user_id: Path<String>,
        form: PictureUpload,
    ) -> Result<PictureCreated> {
        let upload = form.profile_pic;
        let file_name = upload
            .file_name()
            .map(ToString::to_string)
            .ok_or_else(|| PicsError::Validation("`profilePic` is missing a file name".to_string()))?;

        let mut content = upload.into_async_read();
        let picture = self
            .pictures
            .upload(&user_id.0, &file_name, &mut content)
            .await?;

        let location = picture_url(&picture.owner_id, picture.id);
        Ok(PictureCreated::Created(Json(picture.into()), location))
    }

    /// Get Profile Picture
    ///
    /// Returns the raw bytes exactly as they were uploaded.
    #[oai(path = "/users/:user_id/profile_pic/:id", method = "get")]
    pub async fn get_picture(&self, user_id: Path<String>, id: Path<i64>) -> Result<Binary<Bytes>> {
        let data = self.pictures.fetch(&user_id.0, id.0).await?;
        Ok(Binary(data))
    }

    /// Delete Profile Picture
    #[oai(path = "/users/:user_id/profile_pic/:id", method = "delete")]
    pub async fn delete_picture(&self, user_id: Path<String>, id: Path<i64>) -> Result<Deleted> {
        self.pictures.delete(&user_id.0, id.0).await?;
        Ok(Deleted::NoContent)
    }
}
