// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.
pub mod mesh;
pub mod mesh_loader;
pub mod resource_table;
