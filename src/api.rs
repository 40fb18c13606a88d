//! Logical API operations and the URLs they map to.

use tracing::instrument;
use url::Url;

use crate::manager::ConnectionManager;
use crate::request::{Reply, RequestError, RequestOptions};

/// A logical OSF API operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiCall<'a> {
    LoggedInUser,
    Projects,
    ProjectRepos { project_id: &'a str },
    RepoFiles { project_id: &'a str, repo_name: &'a str },
    FileInfo { file_id: &'a str },
}

impl ApiCall<'_> {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::LoggedInUser => "logged_in_user",
            Self::Projects => "projects",
            Self::ProjectRepos { .. } => "project_repos",
            Self::RepoFiles { .. } => "repo_files",
            Self::FileInfo { .. } => "file_info",
        }
    }
}

/// Maps logical operations to concrete URLs.
pub trait UrlBuilder: Send + Sync {
    /// # Errors
    ///
    /// Returns the parse error when the resulting URL is malformed.
    fn build_url(&self, call: ApiCall<'_>) -> Result<Url, url::ParseError>;
}

/// OSF API v2 URL templates joined onto a base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsfUrls {
    base: Url,
}

impl OsfUrls {
    /// # Errors
    ///
    /// Returns the parse error when `base` is not an absolute URL.
    pub fn new(base: &str) -> Result<Self, url::ParseError> {
        let mut base = Url::parse(base)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { base })
    }

    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }
}

impl UrlBuilder for OsfUrls {
    fn build_url(&self, call: ApiCall<'_>) -> Result<Url, url::ParseError> {
        let relative = match call {
            ApiCall::LoggedInUser => "users/me/".to_string(),
            ApiCall::Projects => "users/me/nodes/".to_string(),
            ApiCall::ProjectRepos { project_id } => {
                format!("nodes/{}/files/", urlencoding::encode(project_id))
            }
            ApiCall::RepoFiles {
                project_id,
                repo_name,
            } => format!(
                "nodes/{}/files/{}/",
                urlencoding::encode(project_id),
                urlencoding::encode(repo_name)
            ),
            ApiCall::FileInfo { file_id } => format!("files/{}/", urlencoding::encode(file_id)),
        };
        self.base.join(&relative)
    }
}

impl ConnectionManager {
    fn api_url(&self, call: ApiCall<'_>) -> Result<String, RequestError> {
        self.inner
            .urls
            .build_url(call)
            .map(String::from)
            .map_err(|_| RequestError::invalid_url(call.name()))
    }

    /// Fetches the document of the user the session is authenticated as.
    ///
    /// # Errors
    ///
    /// Returns any [`RequestError`] of the underlying GET.
    #[instrument(skip(self, options))]
    pub async fn get_logged_in_user(&self, options: RequestOptions) -> Result<Reply, RequestError> {
        let url = self.api_url(ApiCall::LoggedInUser)?;
        self.get(&url, options).await
    }

    /// Lists the projects (nodes) of the logged-in user.
    ///
    /// # Errors
    ///
    /// Returns any [`RequestError`] of the underlying GET.
    #[instrument(skip(self, options))]
    pub async fn get_user_projects(&self, options: RequestOptions) -> Result<Reply, RequestError> {
        let url = self.api_url(ApiCall::Projects)?;
        self.get(&url, options).await
    }

    /// Lists the storage providers (repositories) of a project.
    ///
    /// # Errors
    ///
    /// Returns any [`RequestError`] of the underlying GET.
    #[instrument(skip(self, options))]
    pub async fn get_project_repos(
        &self,
        project_id: &str,
        options: RequestOptions,
    ) -> Result<Reply, RequestError> {
        let url = self.api_url(ApiCall::ProjectRepos { project_id })?;
        self.get(&url, options).await
    }

    /// Lists the top-level files of one repository of a project.
    ///
    /// # Errors
    ///
    /// Returns any [`RequestError`] of the underlying GET.
    #[instrument(skip(self, options))]
    pub async fn get_repo_files(
        &self,
        project_id: &str,
        repo_name: &str,
        options: RequestOptions,
    ) -> Result<Reply, RequestError> {
        let url = self.api_url(ApiCall::RepoFiles {
            project_id,
            repo_name,
        })?;
        self.get(&url, options).await
    }

    /// Fetches the metadata document of a file.
    ///
    /// # Errors
    ///
    /// Returns any [`RequestError`] of the underlying GET.
    #[instrument(skip(self, options))]
    pub async fn get_file_info(
        &self,
        file_id: &str,
        options: RequestOptions,
    ) -> Result<Reply, RequestError> {
        let url = self.api_url(ApiCall::FileInfo { file_id })?;
        self.get(&url, options).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn urls() -> OsfUrls {
        OsfUrls::new("https://api.osf.io/v2/").unwrap()
    }

    #[test]
    fn test_osf_url_templates() {
        let urls = urls();
        assert_eq!(
            urls.build_url(ApiCall::LoggedInUser).unwrap().as_str(),
            "https://api.osf.io/v2/users/me/"
        );
        assert_eq!(
            urls.build_url(ApiCall::Projects).unwrap().as_str(),
            "https://api.osf.io/v2/users/me/nodes/"
        );
        assert_eq!(
            urls.build_url(ApiCall::ProjectRepos { project_id: "abc12" })
                .unwrap()
                .as_str(),
            "https://api.osf.io/v2/nodes/abc12/files/"
        );
        assert_eq!(
            urls.build_url(ApiCall::RepoFiles {
                project_id: "abc12",
                repo_name: "osfstorage"
            })
            .unwrap()
            .as_str(),
            "https://api.osf.io/v2/nodes/abc12/files/osfstorage/"
        );
        assert_eq!(
            urls.build_url(ApiCall::FileInfo { file_id: "f1" })
                .unwrap()
                .as_str(),
            "https://api.osf.io/v2/files/f1/"
        );
    }

    #[test]
    fn test_base_without_trailing_slash_keeps_version_segment() {
        let urls = OsfUrls::new("http://127.0.0.1:8080/v2").unwrap();
        assert_eq!(
            urls.build_url(ApiCall::LoggedInUser).unwrap().as_str(),
            "http://127.0.0.1:8080/v2/users/me/"
        );
    }

    #[test]
    fn test_path_segments_are_encoded() {
        let url = urls()
            .build_url(ApiCall::ProjectRepos {
                project_id: "a/../b",
            })
            .unwrap();
        assert_eq!(url.as_str(), "https://api.osf.io/v2/nodes/a%2F..%2Fb/files/");
    }

    #[test]
    fn test_relative_base_is_rejected() {
        assert!(OsfUrls::new("api/v2").is_err());
    }

    #[test]
    fn test_api_call_names() {
        assert_eq!(ApiCall::LoggedInUser.name(), "logged_in_user");
        assert_eq!(ApiCall::FileInfo { file_id: "x" }.name(), "file_info");
    }
}
